//! Artifact classification: Absent, Invalid or Valid.
//!
//! Every stage output goes through the same check, parameterized by a size
//! threshold and a pluggable structural check.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sweep_core::{ArtifactPolicy, ArtifactState, InvalidReason, StructureCheckKind};

/// Structural well-formedness check applied after the size threshold.
pub trait StructuralCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err` carries a human-readable reason.
    fn check(&self, path: &Path) -> Result<(), String>;
}

/// Accepts any content.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStructuralCheck;

impl StructuralCheck for NoStructuralCheck {
    fn name(&self) -> &'static str {
        "none"
    }

    fn check(&self, _path: &Path) -> Result<(), String> {
        Ok(())
    }
}

/// Requires a single, fully closed root element. Catches the truncated
/// output a killed simulator leaves behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlWellFormed;

impl StructuralCheck for XmlWellFormed {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn check(&self, path: &Path) -> Result<(), String> {
        let file = File::open(path).map_err(|e| e.to_string())?;
        let mut reader = Reader::from_reader(BufReader::new(file));
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut depth: usize = 0;
        let mut roots: usize = 0;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(_)) => {
                    if depth == 0 {
                        roots += 1;
                        if roots > 1 {
                            return Err("more than one root element".to_string());
                        }
                    }
                    depth += 1;
                }
                Ok(Event::End(_)) => {
                    depth = match depth.checked_sub(1) {
                        Some(d) => d,
                        None => return Err("closing tag without matching opening tag".to_string()),
                    };
                }
                Ok(Event::Empty(_)) => {
                    if depth == 0 {
                        roots += 1;
                        if roots > 1 {
                            return Err("more than one root element".to_string());
                        }
                    }
                }
                Ok(Event::Text(_)) | Ok(Event::CData(_)) if depth == 0 => {
                    return Err("character data outside the root element".to_string());
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(format!("at byte {}: {}", reader.buffer_position(), e));
                }
            }
            buf.clear();
        }

        if roots == 0 {
            Err("no root element".to_string())
        } else if depth > 0 {
            Err(format!("truncated document, {} element(s) left open", depth))
        } else {
            Ok(())
        }
    }
}

pub fn structural_check_for(kind: StructureCheckKind) -> Arc<dyn StructuralCheck> {
    match kind {
        StructureCheckKind::Xml => Arc::new(XmlWellFormed),
        StructureCheckKind::None => Arc::new(NoStructuralCheck),
    }
}

/// Classify `path`. Valid requires strictly more than `min_size_bytes`.
pub fn validate(path: &Path, min_size_bytes: u64, check: &dyn StructuralCheck) -> ArtifactState {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return ArtifactState::Absent,
        Err(e) => {
            return ArtifactState::Invalid {
                reason: InvalidReason::Malformed {
                    detail: e.to_string(),
                },
            }
        }
    };

    if !metadata.is_file() {
        return ArtifactState::Invalid {
            reason: InvalidReason::Malformed {
                detail: "not a regular file".to_string(),
            },
        };
    }

    let size_bytes = metadata.len();
    if size_bytes <= min_size_bytes {
        return ArtifactState::Invalid {
            reason: InvalidReason::TooSmall {
                size_bytes,
                min_size_bytes,
            },
        };
    }

    match check.check(path) {
        Ok(()) => ArtifactState::Valid { size_bytes },
        Err(detail) => ArtifactState::Invalid {
            reason: InvalidReason::Malformed { detail },
        },
    }
}

/// Remove a file so no later classification can reinterpret it.
/// Returns whether anything was removed.
pub fn discard(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// An expected output: final path plus the rule that makes it valid.
#[derive(Clone)]
pub struct ArtifactSpec {
    pub path: PathBuf,
    pub min_size_bytes: u64,
    pub check: Arc<dyn StructuralCheck>,
}

impl ArtifactSpec {
    pub fn new(path: impl Into<PathBuf>, policy: ArtifactPolicy) -> Self {
        Self {
            path: path.into(),
            min_size_bytes: policy.min_size_bytes,
            check: structural_check_for(policy.check),
        }
    }

    pub fn validate(&self) -> ArtifactState {
        self.validate_at(&self.path)
    }

    /// Apply this artifact's rule to another location (its temp file).
    pub fn validate_at(&self, path: &Path) -> ArtifactState {
        validate(path, self.min_size_bytes, self.check.as_ref())
    }
}

impl fmt::Debug for ArtifactSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactSpec")
            .field("path", &self.path)
            .field("min_size_bytes", &self.min_size_bytes)
            .field("check", &self.check.name())
            .finish()
    }
}
