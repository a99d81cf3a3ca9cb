//! The function/source call stack (`caller`, `FUNCNAME`, `BASH_LINENO`).

use std::collections::VecDeque;
use std::sync::Arc;

use husk_parser::ast;

/// What kind of entry a frame represents.
#[derive(Clone, Debug)]
pub enum FrameKind {
    /// A shell function call.
    Function(Arc<ast::FunctionDefinition>),
    /// A sourced script.
    Source(std::path::PathBuf),
}

/// One frame on the call stack.
#[derive(Clone, Debug)]
pub struct Frame {
    /// The name of the function (or the path of the sourced script).
    pub name: String,
    /// What the frame represents.
    pub kind: FrameKind,
    /// The line number of the call site.
    pub call_line: u32,
    /// The positional parameters that were replaced by this call, restored
    /// when the frame pops.
    pub saved_positional: Vec<String>,
}

impl Frame {
    /// Returns whether this frame is a function call.
    pub const fn is_function(&self) -> bool {
        matches!(self.kind, FrameKind::Function(_))
    }
}

/// The call stack: innermost frame first.
#[derive(Clone, Debug, Default)]
pub struct CallStack {
    frames: VecDeque<Frame>,
}

impl CallStack {
    /// Returns an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a frame.
    pub fn push(&mut self, frame: Frame) {
        self.frames.push_front(frame);
    }

    /// Pops the innermost frame.
    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Returns the innermost frame.
    pub fn top(&self) -> Option<&Frame> {
        self.frames.front()
    }

    /// Returns the frame at the given depth (0 = innermost).
    pub fn get(&self, depth: usize) -> Option<&Frame> {
        self.frames.get(depth)
    }

    /// Returns the stack depth.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns how many function frames are on the stack.
    pub fn function_depth(&self) -> usize {
        self.frames.iter().filter(|f| f.is_function()).count()
    }

    /// Returns whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Iterates innermost-first.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Returns the `FUNCNAME`-style name list, innermost first.
    pub fn function_names(&self) -> Vec<String> {
        self.frames.iter().map(|f| f.name.clone()).collect()
    }
}
