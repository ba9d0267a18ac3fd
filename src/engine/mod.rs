pub mod soffice;
pub mod types;

use crate::{document::DocumentKind, error::EngineError};
use std::path::Path;

pub use types::{EngineDiag, SaveFormat};

/// A converter capability able to start one session per document kind.
pub trait Engine {
    type Session: Session;

    fn doctor(&self) -> Result<EngineDiag, EngineError>;
    fn start(&self, kind: DocumentKind) -> Result<Self::Session, EngineError>;
}

/// A long-lived converter session. `quit` ends the session, `release` frees
/// whatever native resource backs it; both are called exactly once by the
/// owning handle, in that order.
pub trait Session {
    type Document: OpenDocument;

    fn open(&mut self, input: &Path) -> Result<Self::Document, EngineError>;
    fn quit(&mut self) -> Result<(), EngineError>;
    fn release(&mut self);
}

pub trait OpenDocument {
    fn save_as(&mut self, output: &Path, format: SaveFormat) -> Result<(), EngineError>;
    fn close(&mut self, discard_changes: bool) -> Result<(), EngineError>;
    fn release(&mut self);
}
