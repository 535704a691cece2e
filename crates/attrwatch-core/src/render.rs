//! Renderer - a view that re-renders whenever a watched store notifies.
//!
//! Rendering is the store's JSON form as a compact string. The renderer
//! holds only weak store handles and owns its subscriptions, so dropping it
//! stops all rendering.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::domain::{StoreError, StoreId};
use crate::store::{AttributeStore, EventFilter, Subscription};

/// One render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub store: StoreId,
    pub output: String,
}

#[derive(Default)]
pub struct Renderer {
    frames: Rc<RefCell<Vec<Frame>>>,
    subscriptions: Vec<Subscription>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-renders `store` on every event matching `filter`.
    pub fn watch(&mut self, store: &AttributeStore, filter: EventFilter) {
        let frames = self.frames.clone();
        let weak = store.downgrade();
        let subscription = store.subscribe(filter, move |_| {
            let Some(store) = weak.upgrade() else {
                return Ok(());
            };
            let frame = render(&store)?;
            debug!(store = %frame.store, bytes = frame.output.len(), "rendered");
            frames.borrow_mut().push(frame);
            Ok(())
        });
        self.subscriptions.push(subscription);
    }

    /// Renders `store` once, outside of any notification.
    pub fn render_now(&self, store: &AttributeStore) -> Result<(), StoreError> {
        let frame = render(store)?;
        self.frames.borrow_mut().push(frame);
        Ok(())
    }

    pub fn render_count(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn last_output(&self) -> Option<String> {
        self.frames.borrow().last().map(|frame| frame.output.clone())
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames.borrow().clone()
    }

    /// Stops watching every store.
    pub fn unwatch_all(&mut self) {
        self.subscriptions.clear();
    }
}

fn render(store: &AttributeStore) -> Result<Frame, StoreError> {
    let json = store.to_serializable()?;
    Ok(Frame {
        store: store.id(),
        output: json.to_string(),
    })
}
