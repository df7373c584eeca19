use serde::{Deserialize, Serialize, Serializer};

/// Name reported for a face that matches no known identity.
pub const UNKNOWN_NAME: &str = "unknown";

/// Bounding box of a detected face, in pixel coordinates of the frame it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    /// Multiply every coordinate by `factor` (maps a downsampled detection back
    /// to the original frame).
    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            top: self.top.saturating_mul(factor),
            right: self.right.saturating_mul(factor),
            bottom: self.bottom.saturating_mul(factor),
            left: self.left.saturating_mul(factor),
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Face embedding vector. Its length is fixed by the provider that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Embeddings of different length are infinitely far apart.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A registered identity, backed by one reference image in the known-faces directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownFace {
    /// Filename stem of the reference image.
    pub name: String,
    pub filename: String,
    pub embedding: Embedding,
}

/// A face found by a provider: where it is and what it looks like.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub region: FaceRegion,
    pub embedding: Embedding,
}

/// Who a face was resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn name(&self) -> &str {
        match self {
            Identity::Known(name) => name,
            Identity::Unknown => UNKNOWN_NAME,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Outcome of comparing one probe embedding against the known faces.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityMatch {
    pub identity: Identity,
    /// `1 - distance` for a match, 0.0 otherwise. Not a probability.
    pub confidence: f32,
    /// Distance to the nearest known face, if there was one to compare against.
    pub distance: Option<f32>,
}

impl IdentityMatch {
    pub fn unknown(distance: Option<f32>) -> Self {
        Self {
            identity: Identity::Unknown,
            confidence: 0.0,
            distance,
        }
    }
}

/// Recognition result for one face in a frame.
///
/// Serializes as `{"name", "confidence", "box": {top, right, bottom, left}}`.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    #[serde(rename = "name")]
    pub identity: Identity,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub region: FaceRegion,
}

/// Strategy for resolving a probe embedding against the known faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[KnownFace], tolerance: f32) -> IdentityMatch;
}

/// Nearest-neighbour matcher over Euclidean distance.
///
/// Single pass over the gallery; on equal distances the earliest entry wins.
/// A match requires `distance < tolerance` (strict).
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[KnownFace], tolerance: f32) -> IdentityMatch {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, known) in gallery.iter().enumerate() {
            let dist = probe.euclidean_distance(&known.embedding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist < tolerance => IdentityMatch {
                identity: Identity::Known(gallery[idx].name.clone()),
                confidence: (1.0 - best_dist).clamp(0.0, 1.0),
                distance: Some(best_dist),
            },
            Some(_) => IdentityMatch::unknown(Some(best_dist)),
            None => IdentityMatch::unknown(None),
        }
    }
}
