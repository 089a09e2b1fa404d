//! Tree-ensemble adapter: Implementation of UsageModel over exported
//! decision trees.
//!
//! The training pipeline exports each fitted tree as parallel arrays
//! (`children_left`, `children_right`, `feature`, `threshold`, `value`), the
//! layout scikit-learn uses internally. A leaf has `children_left == -1`;
//! a split sends `x[feature] <= threshold` left. The ensemble prediction is
//! the mean of the tree outputs, so a single decision tree and a random
//! forest share one format.
//!
//! # Integrity
//!
//! The artifact directory may carry a `manifest.json` binding the model and
//! encoder files by SHA-256, plus `model.sig`, an Ed25519 signature over the
//! manifest bytes (see the `model_signer` binary):
//! - With a verifying key configured, the signature is mandatory.
//! - With only a manifest, hashes are still checked.
//! - With neither, loading proceeds with a warning unless signatures are
//!   required.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{CategoryEncoders, FEATURE_NAMES};
use crate::ports::{ModelError, UsageModel};

/// Exported model file name.
pub const MODEL_FILE: &str = "usage_model.json";

/// Exported encoder file name.
pub const ENCODERS_FILE: &str = "label_encoders.json";

/// Manifest file name.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Detached signature file name.
pub const SIGNATURE_FILE: &str = "model.sig";

/// Allowed clock skew for manifest timestamps, in seconds.
const MAX_FUTURE_SKEW_SECS: i64 = 300;

/// Node marker for "no child" in exported trees.
const TREE_LEAF: i64 = -1;

/// One exported tree, as written by the training pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<f64>,
}

/// Ensemble flavour recorded by the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleKind {
    DecisionTree,
    RandomForest,
}

/// Model file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedTreeModel {
    pub format_version: u32,
    pub kind: EnsembleKind,
    pub feature_names: Vec<String>,
    pub trees: Vec<ExportedTree>,
}

/// Manifest binding artifact files by SHA-256.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: u32,
    /// Build serial, e.g. a CI build number. Logged on load; ordering is
    /// not enforced, so an older signed manifest still verifies.
    pub serial: u64,
    /// Unix timestamp (seconds) of creation.
    pub created_at: i64,
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf(f64),
}

/// Validated tree ensemble.
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    kind: EnsembleKind,
    feature_names: Vec<String>,
    trees: Vec<Vec<Node>>,
}

impl TreeEnsemble {
    /// Validate an exported model and build the ensemble.
    ///
    /// Every child index must point forward, which also rules out cycles.
    ///
    /// # Errors
    /// Returns `ModelError::Format` describing the first structural problem.
    pub fn from_exported(model: ExportedTreeModel) -> Result<Self, ModelError> {
        if model.format_version != 1 {
            return Err(ModelError::Format(format!(
                "Unsupported model format_version: {}",
                model.format_version
            )));
        }
        let n_features = model.feature_names.len();
        if n_features == 0 {
            return Err(ModelError::Format("Model declares no features".into()));
        }
        if model.trees.is_empty() {
            return Err(ModelError::Format("Model contains no trees".into()));
        }
        if model.kind == EnsembleKind::DecisionTree && model.trees.len() != 1 {
            return Err(ModelError::Format(format!(
                "decision_tree model must contain exactly one tree, found {}",
                model.trees.len()
            )));
        }

        let trees = model
            .trees
            .iter()
            .enumerate()
            .map(|(t, tree)| {
                validate_tree(tree, n_features)
                    .map_err(|msg| ModelError::Format(format!("tree {t}: {msg}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            kind: model.kind,
            feature_names: model.feature_names,
            trees,
        })
    }

    /// Parse and validate a model JSON document.
    ///
    /// # Errors
    /// Returns error if the JSON or tree structure is invalid.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ModelError> {
        let exported: ExportedTreeModel =
            serde_json::from_slice(bytes).map_err(|e| ModelError::Format(e.to_string()))?;
        Self::from_exported(exported)
    }

    #[must_use]
    pub fn kind(&self) -> EnsembleKind {
        self.kind
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

fn validate_tree(tree: &ExportedTree, n_features: usize) -> Result<Vec<Node>, String> {
    let n = tree.children_left.len();
    if n == 0 {
        return Err("tree has no nodes".into());
    }
    if tree.children_right.len() != n
        || tree.feature.len() != n
        || tree.threshold.len() != n
        || tree.value.len() != n
    {
        return Err("node arrays have different lengths".into());
    }

    let child = |i: usize, raw: i64| -> Result<usize, String> {
        usize::try_from(raw)
            .ok()
            .filter(|&c| c > i && c < n)
            .ok_or_else(|| format!("node {i} has invalid child index {raw}"))
    };

    let mut nodes = Vec::with_capacity(n);
    for i in 0..n {
        let (l, r) = (tree.children_left[i], tree.children_right[i]);
        if l == TREE_LEAF && r == TREE_LEAF {
            let value = tree.value[i];
            if !value.is_finite() {
                return Err(format!("leaf {i} has non-finite value"));
            }
            nodes.push(Node::Leaf(value));
            continue;
        }

        let feature = usize::try_from(tree.feature[i])
            .ok()
            .filter(|&f| f < n_features)
            .ok_or_else(|| format!("node {i} splits on unknown feature {}", tree.feature[i]))?;
        let threshold = tree.threshold[i];
        if !threshold.is_finite() {
            return Err(format!("node {i} has non-finite threshold"));
        }
        nodes.push(Node::Split {
            feature,
            threshold,
            left: child(i, l)?,
            right: child(i, r)?,
        });
    }
    Ok(nodes)
}

fn predict_tree(nodes: &[Node], features: &[f64]) -> f64 {
    let mut i = 0;
    loop {
        match nodes[i] {
            Node::Leaf(value) => return value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                i = if features[feature] <= threshold { left } else { right };
            }
        }
    }
}

impl UsageModel for TreeEnsemble {
    fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.feature_count() {
            return Err(ModelError::FeatureCount {
                expected: self.feature_count(),
                actual: features.len(),
            });
        }
        let sum: f64 = self.trees.iter().map(|t| predict_tree(t, features)).sum();
        Ok(sum / self.trees.len() as f64)
    }
}

/// How much of the artifact directory was verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Manifest signature and file hashes checked.
    Signed,
    /// File hashes checked against an unsigned manifest.
    HashesOnly,
    /// No manifest present.
    Unverified,
}

/// Verification requirements for artifact loading.
#[derive(Debug, Clone, Default)]
pub struct ArtifactPolicy {
    verifying_key: Option<VerifyingKey>,
    require_signature: bool,
}

impl ArtifactPolicy {
    #[must_use]
    pub fn new(verifying_key: Option<VerifyingKey>, require_signature: bool) -> Self {
        Self {
            verifying_key,
            require_signature,
        }
    }

    /// Build a policy from an optional file holding a base64 verifying key.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or the key is invalid.
    pub fn from_pubkey_file(
        path: Option<&Path>,
        require_signature: bool,
    ) -> Result<Self, ModelError> {
        let verifying_key = match path {
            Some(p) => {
                let b64 = fs::read_to_string(p).map_err(|source| ModelError::Io {
                    path: p.display().to_string(),
                    source,
                })?;
                Some(verifying_key_from_b64(&b64)?)
            }
            None => None,
        };
        Ok(Self::new(verifying_key, require_signature))
    }
}

/// Decode a base64 Ed25519 verifying key.
///
/// # Errors
/// Returns `ModelError::Integrity` if the key is malformed.
pub fn verifying_key_from_b64(b64: &str) -> Result<VerifyingKey, ModelError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|_| ModelError::Integrity("Invalid public key base64".into()))?;
    let key: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| ModelError::Integrity("Invalid public key length (expected 32 bytes)".into()))?;
    VerifyingKey::from_bytes(&key).map_err(|_| ModelError::Integrity("Invalid verifying key".into()))
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// Constant-time compare for ASCII strings (used for SHA-256 hex digests).
fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn read(path: &Path) -> Result<Vec<u8>, ModelError> {
    fs::read(path).map_err(|source| ModelError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn verify_directory(dir: &Path, policy: &ArtifactPolicy) -> Result<Verification, ModelError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let sig_path = dir.join(SIGNATURE_FILE);

    if !manifest_path.exists() {
        if policy.verifying_key.is_some() || policy.require_signature {
            tracing::error!("Model manifest not found at {:?}", manifest_path);
            return Err(ModelError::Integrity(format!(
                "Signed artifacts required but {MANIFEST_FILE} is missing"
            )));
        }
        tracing::warn!(
            "Loading UNVERIFIED model artifacts from {:?} (no {MANIFEST_FILE})",
            dir
        );
        return Ok(Verification::Unverified);
    }

    let manifest_bytes = read(&manifest_path)?;

    let signed = match &policy.verifying_key {
        Some(key) => {
            let sig_bytes = read(&sig_path)?;
            let sig: [u8; 64] = sig_bytes.as_slice().try_into().map_err(|_| {
                ModelError::Integrity("Invalid signature length (expected 64 bytes)".into())
            })?;
            key.verify(&manifest_bytes, &Signature::from_bytes(&sig))
                .map_err(|_| ModelError::Integrity("Invalid manifest signature".into()))?;
            true
        }
        None if policy.require_signature => {
            return Err(ModelError::Integrity(
                "Signed artifacts required but no verifying key is configured".into(),
            ));
        }
        None => false,
    };

    let manifest: ArtifactManifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| ModelError::Integrity(format!("Invalid {MANIFEST_FILE} format: {e}")))?;
    if manifest.version != 1 {
        return Err(ModelError::Integrity(format!(
            "Unsupported manifest version: {}",
            manifest.version
        )));
    }
    if manifest.created_at > chrono::Utc::now().timestamp() + MAX_FUTURE_SKEW_SECS {
        return Err(ModelError::Integrity(
            "manifest created_at is in the future".into(),
        ));
    }
    for required in [MODEL_FILE, ENCODERS_FILE] {
        if !manifest.files.contains_key(required) {
            return Err(ModelError::Integrity(format!(
                "{MANIFEST_FILE} must bind {required}"
            )));
        }
    }

    for (rel, expected_hex) in &manifest.files {
        let bytes = read(&dir.join(rel))?;
        if !constant_time_eq_str(&sha256_hex(&bytes), expected_hex) {
            return Err(ModelError::Integrity(format!("File hash mismatch for {rel}")));
        }
    }

    tracing::info!(
        "Model manifest verified (serial={}, signed={})",
        manifest.serial,
        signed
    );
    Ok(if signed {
        Verification::Signed
    } else {
        Verification::HashesOnly
    })
}

/// Everything loaded from the artifact directory.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub model: TreeEnsemble,
    pub encoders: CategoryEncoders,
    pub verification: Verification,
}

/// Load and verify the model and encoders from `dir`.
///
/// The model must take exactly the features `language, area, industry, n`.
///
/// # Errors
/// Returns error if verification fails or either file is invalid.
pub fn load_artifacts(dir: &Path, policy: &ArtifactPolicy) -> Result<ModelArtifacts, ModelError> {
    let verification = verify_directory(dir, policy)?;

    let model = TreeEnsemble::from_json(&read(&dir.join(MODEL_FILE))?)?;
    if model.feature_names() != FEATURE_NAMES {
        return Err(ModelError::Format(format!(
            "Model features {:?} do not match expected {:?}",
            model.feature_names(),
            FEATURE_NAMES
        )));
    }

    let encoders = CategoryEncoders::from_json(&read(&dir.join(ENCODERS_FILE))?)
        .map_err(|e| ModelError::Format(e.to_string()))?;

    tracing::info!(
        "Loaded {:?} model from {:?} (trees={}, n_features={}, verification={:?})",
        model.kind(),
        dir,
        model.tree_count(),
        model.feature_count(),
        verification
    );

    Ok(ModelArtifacts {
        model,
        encoders,
        verification,
    })
}
