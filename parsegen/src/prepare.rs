//! `PREPARE_CONTEXT`: load the document text and the reference schema.
//!
//! Missing or unreadable inputs never fail the run. They degrade to empty
//! values and a warning; the harness reports the real problem later.

use tracing::{info, warn};

use crate::core::state::{AgentState, DerivedContext, StateUpdate};
use crate::io::document::DocumentExtractor;
use crate::io::reference::read_schema;

pub struct ContextPreparer {
    extractor: DocumentExtractor,
}

impl ContextPreparer {
    pub fn new(extractor: DocumentExtractor) -> Self {
        Self { extractor }
    }

    pub fn prepare(&self, state: &AgentState) -> StateUpdate {
        let run = &state.run;

        let document_text = match self.extractor.extract_text(&run.document_path) {
            Ok(Some(text)) => text,
            Ok(None) => {
                warn!(path = %run.document_path.display(), "document not found, using empty text");
                String::new()
            }
            Err(err) => {
                warn!(path = %run.document_path.display(), err = %format!("{err:#}"), "document extraction failed, using empty text");
                String::new()
            }
        };

        let schema = if run.reference_path.exists() {
            read_schema(&run.reference_path).unwrap_or_else(|err| {
                warn!(path = %run.reference_path.display(), err = %format!("{err:#}"), "reference unreadable, using empty schema");
                Vec::new()
            })
        } else {
            warn!(path = %run.reference_path.display(), "reference not found, using empty schema");
            Vec::new()
        };

        info!(
            document_bytes = document_text.len(),
            columns = schema.len(),
            "context prepared"
        );
        StateUpdate::Context(DerivedContext {
            document_text,
            schema,
        })
    }
}
