// SPDX-License-Identifier: Apache-2.0
//! The validation context: an arena of location records and a stack of
//! handles into it.
//!
//! Locations are never removed from the arena; popping only shortens the
//! stack. That keeps parent links stable without reference cycles, and lets
//! a failure recorded deep in a message carry its full dot-joined path.
//!
//! Failing a location records a failure and marks the location `done`;
//! applying a validator at a done (or skipped) location is a no-op, so a
//! chain of checks at one location short-circuits after the first failure
//! while checks at sibling locations still run and accumulate.

use trac_error::{ErrorDetail, ErrorKind, TracError};

// ---------------------------------------------------------------------------
// Location arena
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Location {
    parent: Option<usize>,
    name: String,
    skipped: bool,
    failed: bool,
    done: bool,
}

/// Which class of check a context is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationType {
    /// Shape of a single message.
    Static,
    /// New version against the prior version.
    Version,
    /// References against a loaded bundle and platform resources.
    Consistency,
}

impl ValidationType {
    /// The error kind failures of this class map to.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Self::Static => ErrorKind::InputValidation,
            Self::Version => ErrorKind::VersionValidation,
            Self::Consistency => ErrorKind::ConsistencyValidation,
        }
    }
}

/// Validation state threaded through every check.
#[derive(Debug)]
pub struct ValidationContext {
    validation_type: ValidationType,
    arena: Vec<Location>,
    stack: Vec<usize>,
    failures: Vec<ErrorDetail>,
    aborted: Option<String>,
}

impl ValidationContext {
    fn new(validation_type: ValidationType, root_name: &str) -> Self {
        let root = Location {
            parent: None,
            name: root_name.to_string(),
            skipped: false,
            failed: false,
            done: false,
        };
        Self {
            validation_type,
            arena: vec![root],
            stack: vec![0],
            failures: Vec::new(),
            aborted: None,
        }
    }

    /// Root context for request-time (static) validation of one method.
    pub fn for_method(method: trac_metadata::MetadataMethod) -> Self {
        Self::new(ValidationType::Static, &method.to_string())
    }

    /// Root context for static validation of a free-standing message.
    pub fn for_message(message_name: &str) -> Self {
        Self::new(ValidationType::Static, message_name)
    }

    /// Root context for version validation (current against prior).
    pub fn for_version() -> Self {
        Self::new(ValidationType::Version, "")
    }

    /// Root context for consistency validation against a bundle.
    pub fn for_consistency() -> Self {
        Self::new(ValidationType::Consistency, "")
    }

    /// The class of check this context is running.
    pub fn validation_type(&self) -> ValidationType {
        self.validation_type
    }

    // -- Traversal ------------------------------------------------------

    fn current(&self) -> usize {
        *self.stack.last().expect("validation stack never empties")
    }

    /// Enter a named field.
    pub fn push(&mut self, field: &str) -> &mut Self {
        self.push_location(field.to_string())
    }

    /// Enter one item of a repeated field.
    pub fn push_index(&mut self, index: usize) -> &mut Self {
        self.push_location(index.to_string())
    }

    /// Enter one value of a map field.
    pub fn push_map_key(&mut self, key: &str) -> &mut Self {
        self.push_location(key.to_string())
    }

    fn push_location(&mut self, name: String) -> &mut Self {
        let parent = self.current();
        // A child of a skipped or done location is born skipped, so every
        // descendant check is a no-op.
        let skipped = {
            let p = &self.arena[parent];
            p.skipped || p.done
        };
        self.arena.push(Location {
            parent: Some(parent),
            name,
            skipped,
            failed: false,
            done: skipped,
        });
        let handle = self.arena.len() - 1;
        self.stack.push(handle);
        self
    }

    /// Leave the current location.
    ///
    /// The root cannot be popped; trying to is a framework bug and aborts
    /// validation.
    pub fn pop(&mut self) -> &mut Self {
        if self.stack.len() <= 1 {
            self.abort("pop() called at the validation root");
        } else {
            self.stack.pop();
        }
        self
    }

    fn path(&self) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(self.current());
        while let Some(handle) = cursor {
            let loc = &self.arena[handle];
            if loc.parent.is_some() {
                parts.push(loc.name.as_str());
            }
            cursor = loc.parent;
        }
        parts.reverse();
        parts.join(".")
    }

    // -- Outcomes -------------------------------------------------------

    /// Record a failure at the current location and mark it done.
    pub fn error(&mut self, message: impl Into<String>) -> &mut Self {
        let handle = self.current();
        if !self.arena[handle].skipped {
            self.failures.push(ErrorDetail::new(self.path(), message));
            let loc = &mut self.arena[handle];
            loc.failed = true;
            loc.done = true;
        }
        self
    }

    /// Mark the current location skipped; descendants are skipped too.
    pub fn skip(&mut self) -> &mut Self {
        let handle = self.current();
        let loc = &mut self.arena[handle];
        loc.skipped = true;
        loc.done = true;
        self
    }

    /// Whether checks at the current location should still run.
    pub fn is_active(&self) -> bool {
        let loc = &self.arena[self.current()];
        !(loc.skipped || loc.done) && self.aborted.is_none()
    }

    /// Whether any failure has been recorded anywhere.
    pub fn failed(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Abort validation: a programmer error, not a validation failure.
    ///
    /// Dispatching a validator against the wrong payload type lands here;
    /// it is never reported as a client-visible validation failure.
    pub fn abort(&mut self, message: impl Into<String>) -> &mut Self {
        if self.aborted.is_none() {
            self.aborted = Some(message.into());
        }
        self
    }

    // -- Application ----------------------------------------------------

    /// Run a validator on a value at the current location.
    ///
    /// No-op when the location is done, skipped, or validation aborted.
    pub fn apply<T: ?Sized>(
        &mut self,
        validator: impl FnOnce(&mut Self, &T),
        value: &T,
    ) -> &mut Self {
        if self.is_active() {
            validator(self, value);
        }
        self
    }

    /// `push(field)`, apply, `pop()` in one call.
    pub fn apply_at<T: ?Sized>(
        &mut self,
        field: &str,
        validator: impl FnOnce(&mut Self, &T),
        value: &T,
    ) -> &mut Self {
        self.push(field);
        self.apply(validator, value);
        self.pop()
    }

    /// Presence check: record an error when the value is absent.
    ///
    /// Returns the value so the caller can continue validating it in place.
    pub fn required<'a, T: ?Sized>(&mut self, value: Option<&'a T>, what: &str) -> Option<&'a T> {
        if self.is_active() && value.is_none() {
            self.error(format!("{what} must be specified"));
        }
        value
    }

    /// Absence check: record an error when the value is present.
    pub fn omitted<T>(&mut self, value: Option<&T>, what: &str) -> &mut Self {
        if self.is_active() && value.is_some() {
            self.error(format!("{what} must not be specified"));
        }
        self
    }

    // -- Results --------------------------------------------------------

    /// Failures recorded so far.
    pub fn failures(&self) -> &[ErrorDetail] {
        &self.failures
    }

    /// Finish validation.
    ///
    /// An abort surfaces as an internal error regardless of any recorded
    /// failures; otherwise failures map to the kind of this context's
    /// validation type.
    pub fn finish(self) -> Result<(), TracError> {
        if let Some(reason) = self.aborted {
            return Err(TracError::new(
                ErrorKind::Internal,
                format!("validation aborted: {reason}"),
            ));
        }
        if self.failures.is_empty() {
            return Ok(());
        }
        let kind = self.validation_type.error_kind();
        let message = match kind {
            ErrorKind::VersionValidation => "version validation failed",
            ErrorKind::ConsistencyValidation => "consistency validation failed",
            _ => "validation failed",
        };
        Err(TracError::new(kind, message).with_details(self.failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_context_finishes_ok() {
        let ctx = ValidationContext::for_message("Tag");
        assert!(ctx.finish().is_ok());
    }

    #[test]
    fn failure_paths_are_dot_joined() {
        let mut ctx = ValidationContext::for_message("MetadataWriteRequest");
        ctx.push("tagUpdates");
        ctx.push_index(2);
        ctx.push("attrName");
        ctx.error("attribute name is reserved");
        ctx.pop().pop().pop();

        let err = ctx.finish().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InputValidation);
        assert_eq!(err.details[0].location, "tagUpdates.2.attrName");
    }

    #[test]
    fn error_short_circuits_further_checks_at_the_same_location() {
        let mut ctx = ValidationContext::for_message("m");
        ctx.push("field");
        ctx.error("first problem");
        assert!(!ctx.is_active());
        ctx.apply(|ctx, _: &str| {
            ctx.error("second problem");
        }, "x");
        ctx.pop();
        assert_eq!(ctx.failures().len(), 1);
    }

    #[test]
    fn sibling_locations_still_accumulate() {
        let mut ctx = ValidationContext::for_message("m");
        ctx.push("a");
        ctx.error("bad a");
        ctx.pop();
        ctx.push("b");
        ctx.error("bad b");
        ctx.pop();
        assert_eq!(ctx.failures().len(), 2);
    }

    #[test]
    fn skip_marks_descendants_skipped() {
        let mut ctx = ValidationContext::for_message("m");
        ctx.push("outer");
        ctx.skip();
        ctx.push("inner");
        ctx.error("should not be recorded");
        ctx.pop().pop();
        assert!(!ctx.failed());
    }

    #[test]
    fn required_and_omitted() {
        let mut ctx = ValidationContext::for_message("m");
        ctx.push("definition");
        assert!(ctx.required(None::<&i32>, "definition").is_none());
        ctx.pop();
        ctx.push("priorVersion");
        ctx.omitted(Some(&1), "prior version");
        ctx.pop();

        let err = ctx.finish().unwrap_err();
        assert_eq!(err.details.len(), 2);
        assert!(err.details[0].message.contains("must be specified"));
        assert!(err.details[1].message.contains("must not be specified"));
    }

    #[test]
    fn abort_wins_over_failures() {
        let mut ctx = ValidationContext::for_message("m");
        ctx.push("f");
        ctx.error("client problem");
        ctx.pop();
        ctx.abort("validator applied to wrong message type");
        let err = ctx.finish().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn popping_the_root_aborts() {
        let mut ctx = ValidationContext::for_message("m");
        ctx.pop();
        assert!(ctx.finish().is_err());
    }

    #[test]
    fn version_context_maps_to_version_kind() {
        let mut ctx = ValidationContext::for_version();
        ctx.push("schema");
        ctx.error("field removed");
        ctx.pop();
        let err = ctx.finish().unwrap_err();
        assert_eq!(err.kind, ErrorKind::VersionValidation);
    }
}
