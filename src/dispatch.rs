//! Hand-off of external changes to the model thread
//!
//! Backing stores that watch their source (a socket, a file watcher, a
//! database notification channel) run on their own threads and must not
//! touch the tree. They send [`ExternalChange`]s through a [`ChangeSender`];
//! the model thread applies them with [`Dispatcher::drain`].

use std::sync::mpsc::{channel, Receiver, Sender};

use log::debug;

use crate::error::{Error, Result};
use crate::model::Model;
use crate::tree::NodeId;

/// A change reported by a backing store, with serialized content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalChange {
    Insert {
        parent: NodeId,
        index: Option<usize>,
        dirty: bool,
        content: String,
    },
    Update {
        reference: NodeId,
        content: String,
    },
    Remove {
        parent: NodeId,
        content: String,
    },
}

impl ExternalChange {
    /// Apply this change to the model
    pub fn apply(&self, model: &mut Model) -> Result<()> {
        match self {
            ExternalChange::Insert {
                parent,
                index,
                dirty,
                content,
            } => model.insert_from_text(*parent, content, *index, *dirty).map(|_| ()),
            ExternalChange::Update { reference, content } => model.update_from_text(*reference, content),
            ExternalChange::Remove { parent, content } => model.remove_from_text(*parent, content).map(|_| ()),
        }
    }
}

/// Sending half, cloneable and `Send`
#[derive(Debug, Clone)]
pub struct ChangeSender {
    sender: Sender<ExternalChange>,
}

impl ChangeSender {
    /// Queue a change. Fails once the dispatcher is gone.
    pub fn send(&self, change: ExternalChange) -> Result<()> {
        self.sender.send(change).map_err(|e| Error::Unsupported {
            operation: "send".to_string(),
            target: format!("a closed dispatch queue ({:?})", e.0),
        })
    }
}

/// Receiving half, owned by the model thread
#[derive(Debug)]
pub struct Dispatcher {
    sender: Sender<ExternalChange>,
    receiver: Receiver<ExternalChange>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self { sender, receiver }
    }

    /// A sender for another thread
    pub fn sender(&self) -> ChangeSender {
        ChangeSender {
            sender: self.sender.clone(),
        }
    }

    /// Apply every queued change in arrival order, returning one result per
    /// change. Failures are not retried.
    pub fn drain(&self, model: &mut Model) -> Vec<Result<()>> {
        let results: Vec<Result<()>> = self.receiver.try_iter().map(|change| change.apply(model)).collect();
        if !results.is_empty() {
            debug!(
                "applied {} external change(s), {} failed",
                results.len(),
                results.iter().filter(|r| r.is_err()).count()
            );
        }
        results
    }
}
