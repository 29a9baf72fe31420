use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
};

use ensemble_scenario::Value;

/// Variable bindings visible while evaluating expressions.
///
/// Bindings live in frames. A frame is pushed with [`Scope::frame`] and popped when the returned
/// guard is dropped, so bindings never outlive the block that introduced them, even when that
/// block fails part way through.
#[derive(Debug, Default)]
pub struct Scope {
    frames: Vec<HashMap<String, Value>>,
}

impl Scope {
    pub fn new() -> Self {
        Default::default()
    }

    /// Innermost binding of `name`.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&mut self) -> Frame<'_> {
        self.frames.push(HashMap::new());
        Frame { scope: self }
    }
}

/// An open frame. Dereferences to the scope it was pushed on.
#[derive(Debug)]
pub struct Frame<'s> {
    scope: &'s mut Scope,
}

impl Frame<'_> {
    /// Bind `name` in this frame, shadowing outer bindings.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.scope.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }
}

impl Deref for Frame<'_> {
    type Target = Scope;

    fn deref(&self) -> &Scope {
        self.scope
    }
}

impl DerefMut for Frame<'_> {
    fn deref_mut(&mut self) -> &mut Scope {
        self.scope
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        self.scope.frames.pop();
    }
}
