//! Per-caller engine context.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Explicit context threaded through every engine call.
///
/// Holds the active version and the change-control skip depth. Sessions are
/// cheap and independent; any number may share one [`crate::Lix`].
#[derive(Debug)]
pub struct Session {
    active_version_id: String,
    skip_depth: Arc<AtomicUsize>,
}

impl Session {
    pub(crate) fn new(active_version_id: impl Into<String>) -> Self {
        Self {
            active_version_id: active_version_id.into(),
            skip_depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Id of the version reads and writes go to.
    pub fn active_version_id(&self) -> &str {
        &self.active_version_id
    }

    pub(crate) fn set_active_version(&mut self, version_id: impl Into<String>) {
        self.active_version_id = version_id.into();
    }

    /// Suspend change detection until the returned guard is dropped.
    ///
    /// Guards nest; detection resumes when the outermost one goes away.
    pub fn skip_change_control(&self) -> SkipChangeControl {
        self.skip_depth.fetch_add(1, Ordering::SeqCst);
        SkipChangeControl {
            depth: self.skip_depth.clone(),
        }
    }

    /// Whether a [`SkipChangeControl`] guard is alive.
    pub fn is_change_control_skipped(&self) -> bool {
        self.skip_depth.load(Ordering::SeqCst) > 0
    }
}

/// Scope guard returned by [`Session::skip_change_control`].
#[derive(Debug)]
#[must_use = "change control resumes as soon as the guard is dropped"]
pub struct SkipChangeControl {
    depth: Arc<AtomicUsize>,
}

impl Drop for SkipChangeControl {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_guards_nest() {
        let session = Session::new("v1");
        assert!(!session.is_change_control_skipped());

        let outer = session.skip_change_control();
        {
            let _inner = session.skip_change_control();
            assert!(session.is_change_control_skipped());
        }
        assert!(session.is_change_control_skipped());

        drop(outer);
        assert!(!session.is_change_control_skipped());
    }

    #[test]
    fn test_switch_active_version() {
        let mut session = Session::new("v1");
        session.set_active_version("v2");
        assert_eq!(session.active_version_id(), "v2");
    }
}
