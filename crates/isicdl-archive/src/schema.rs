//! ISIC archive image API schema
//!
//! Only the fields the pipeline depends on are decoded: the image id, the
//! clinical diagnosis used as label, and the file URLs.

use isicdl_core::{PipelineError, WorkItem};
use serde::Deserialize;

/// Which file of an image record to download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageVariant {
    /// 256px thumbnail (`files.thumbnail_256`)
    #[default]
    Thumbnail,
    /// Full-resolution original (`files.full`)
    Full,
}

impl ImageVariant {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "thumbnail" => Some(Self::Thumbnail),
            "full" => Some(Self::Full),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::Full => "full",
        }
    }
}

/// One unit of work: an image to fetch and the label it is filed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub id: String,
    pub label: String,
    pub url: String,
}

impl WorkItem for CatalogRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One fetched page of the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPage {
    /// Total catalog size; only meaningful on the first page
    pub count: u64,
    /// Cursor URL of the next page, `None` on the last page
    pub next: Option<String>,
    pub results: Vec<CatalogRecord>,
}

#[derive(Deserialize)]
struct RawPage {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    next: Option<String>,
    results: Vec<RawImage>,
}

#[derive(Deserialize)]
struct RawImage {
    isic_id: String,
    #[serde(default)]
    metadata: RawMetadata,
    files: RawFiles,
}

#[derive(Deserialize, Default)]
struct RawMetadata {
    #[serde(default)]
    clinical: RawClinical,
}

#[derive(Deserialize, Default)]
struct RawClinical {
    #[serde(default)]
    diagnosis: Option<String>,
}

#[derive(Deserialize)]
struct RawFiles {
    #[serde(default)]
    full: Option<RawFile>,
    #[serde(default)]
    thumbnail_256: Option<RawFile>,
}

#[derive(Deserialize)]
struct RawFile {
    url: String,
}

impl RawImage {
    fn into_record(self, variant: ImageVariant) -> Result<CatalogRecord, String> {
        if self.isic_id.is_empty() {
            return Err("record with empty isic_id".to_string());
        }
        let file = match variant {
            ImageVariant::Thumbnail => self.files.thumbnail_256,
            ImageVariant::Full => self.files.full,
        };
        let url = file
            .map(|f| f.url)
            .ok_or_else(|| format!("{}: no {} file", self.isic_id, variant.name()))?;
        Ok(CatalogRecord {
            id: self.isic_id,
            label: self.metadata.clinical.diagnosis.unwrap_or_default(),
            url,
        })
    }
}

/// Decode a page body fetched from `url`.
///
/// A missing or null diagnosis becomes the empty label. A record without
/// the requested file variant, or with an empty id, makes the whole page
/// malformed.
pub fn decode_page(url: &str, body: &[u8], variant: ImageVariant) -> Result<CatalogPage, PipelineError> {
    let decode_err = |message: String| PipelineError::Decode {
        url: url.to_string(),
        message,
    };

    let raw: RawPage = serde_json::from_slice(body).map_err(|e| decode_err(e.to_string()))?;
    let results = raw
        .results
        .into_iter()
        .map(|img| img.into_record(variant))
        .collect::<Result<Vec<_>, _>>()
        .map_err(decode_err)?;

    Ok(CatalogPage {
        count: raw.count,
        next: raw.next,
        results,
    })
}
