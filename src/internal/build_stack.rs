//! Bi-directional dependency detection for a single build session.

use std::any::TypeId;
use std::cell::RefCell;
use std::sync::Arc;

use crate::error::{BuildError, BuildFailure};
use crate::instance::InstanceId;

/// Identifies an in-progress build: the requested plugin type and the instance
/// chosen for it.
pub(crate) type FrameKey = (TypeId, InstanceId);

struct Frame {
    key: FrameKey,
    description: Arc<str>,
}

/// Stack of instances currently being built by one session.
pub(crate) struct BuildStack {
    frames: RefCell<Vec<Frame>>,
    max_depth: usize,
}

impl BuildStack {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            frames: RefCell::new(Vec::new()),
            max_depth,
        }
    }

    /// Pushes a frame, failing if `key` is already being built or the stack
    /// is full. The frame is popped when the guard drops.
    pub(crate) fn push(&self, key: FrameKey, description: &Arc<str>) -> Result<StackGuard<'_>, BuildError> {
        let mut frames = self.frames.borrow_mut();

        // Cycle check before pushing
        if let Some(start) = frames.iter().position(|frame| frame.key == key) {
            let mut cycle: Vec<String> = frames[start..].iter().map(|f| f.description.to_string()).collect();
            cycle.push(description.to_string());
            let path = frames.iter().map(|f| f.description.to_string()).collect();
            return Err(BuildError::new(path, BuildFailure::CycleDetected(cycle)));
        }

        if frames.len() >= self.max_depth {
            let path = frames.iter().map(|f| f.description.to_string()).collect();
            return Err(BuildError::new(path, BuildFailure::DepthExceeded(self.max_depth)));
        }

        frames.push(Frame {
            key,
            description: description.clone(),
        });
        Ok(StackGuard { stack: self, key })
    }

    /// Descriptions of the frames from the outermost request inwards.
    pub(crate) fn path(&self) -> Vec<String> {
        self.frames
            .borrow()
            .iter()
            .map(|frame| frame.description.to_string())
            .collect()
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Pops its frame from the build stack on drop.
pub(crate) struct StackGuard<'s> {
    stack: &'s BuildStack,
    key: FrameKey,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        let popped = self.stack.frames.borrow_mut().pop();
        debug_assert_eq!(popped.map(|frame| frame.key), Some(self.key));
    }
}
