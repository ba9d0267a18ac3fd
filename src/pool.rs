use crate::{
    document::DocumentKind,
    engine::{Engine, OpenDocument, SaveFormat, Session},
    error::EngineError,
};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::Path;
use tracing::{debug, info, warn};

/// One started converter session for one document kind.
///
/// Quitting and releasing happen once, through [`ConverterHandle::shutdown`]
/// or, failing that, on drop.
pub struct ConverterHandle<S: Session> {
    kind: DocumentKind,
    session: S,
    shut_down: bool,
}

impl<S: Session> ConverterHandle<S> {
    fn new(kind: DocumentKind, session: S) -> Self {
        Self {
            kind,
            session,
            shut_down: false,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// open -> save as PDF -> close. The document is released on every path,
    /// including a failed save.
    pub fn convert(&mut self, input: &Path, output: &Path) -> Result<(), EngineError> {
        let document = self.session.open(input)?;
        let mut guard = DocumentGuard::new(document);
        guard.document.save_as(output, SaveFormat::Pdf)?;
        guard.close()
    }

    fn shutdown(&mut self) -> Result<(), EngineError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        let quit = self.session.quit();
        self.session.release();
        quit
    }
}

impl<S: Session> Drop for ConverterHandle<S> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!("{} converter did not quit cleanly: {err}", self.kind);
        }
    }
}

struct DocumentGuard<D: OpenDocument> {
    document: D,
    closed: bool,
}

impl<D: OpenDocument> DocumentGuard<D> {
    fn new(document: D) -> Self {
        Self {
            document,
            closed: false,
        }
    }

    fn close(mut self) -> Result<(), EngineError> {
        self.closed = true;
        self.document.close(true)
    }
}

impl<D: OpenDocument> Drop for DocumentGuard<D> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.document.close(true) {
                debug!("closing abandoned document failed: {err}");
            }
        }
        self.document.release();
    }
}

/// Converter handles for one batch, started on first use per kind.
pub struct ConverterPool<'e, E: Engine> {
    engine: &'e E,
    handles: BTreeMap<DocumentKind, ConverterHandle<E::Session>>,
}

impl<'e, E: Engine> ConverterPool<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self {
            engine,
            handles: BTreeMap::new(),
        }
    }

    pub fn handle(
        &mut self,
        kind: DocumentKind,
    ) -> Result<&mut ConverterHandle<E::Session>, EngineError> {
        match self.handles.entry(kind) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let session = self.engine.start(kind)?;
                Ok(e.insert(ConverterHandle::new(kind, session)))
            }
        }
    }

    /// Quits and releases every started handle. Returns how many were torn
    /// down; calling it again is a no-op.
    pub fn shutdown(&mut self) -> usize {
        let handles = std::mem::take(&mut self.handles);
        let count = handles.len();
        for (kind, mut handle) in handles {
            match handle.shutdown() {
                Ok(()) => info!("{kind} converter shut down"),
                Err(err) => warn!("{kind} converter did not quit cleanly: {err}"),
            }
        }
        count
    }
}

impl<E: Engine> Drop for ConverterPool<'_, E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
