use std::fmt;

/// Diagnostic trace of the operations applied to a [`Picture`](crate::Picture).
///
/// Purely informational: nothing in the render path reads it back, so it never affects pixels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessStack {
    entries: Vec<StackEntry>,
}

/// One entry of a [`ProcessStack`].
#[derive(Clone, Debug, PartialEq)]
pub enum StackEntry {
    /// A single operation on one picture.
    Step(String),
    /// Two pictures combined into one; both inputs keep their own history.
    Blend {
        /// Blend operator name.
        label: String,
        /// History of the lower picture.
        base: ProcessStack,
        /// History of the upper picture.
        top: ProcessStack,
    },
}

impl ProcessStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(label: impl Into<String>) -> Self {
        let mut s = Self::new();
        s.push(label);
        s
    }

    pub fn push(&mut self, label: impl Into<String>) {
        self.entries.push(StackEntry::Step(label.into()));
    }

    /// History of a picture produced by blending `top` over `base`.
    pub fn blend(label: impl Into<String>, base: ProcessStack, top: ProcessStack) -> Self {
        Self {
            entries: vec![StackEntry::Blend {
                label: label.into(),
                base,
                top,
            }],
        }
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flat list of step labels in application order, blends expanded depth-first.
    pub fn labels(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_labels(&mut out);
        out
    }

    fn collect_labels(&self, out: &mut Vec<String>) {
        for e in &self.entries {
            match e {
                StackEntry::Step(s) => out.push(s.clone()),
                StackEntry::Blend { label, base, top } => {
                    base.collect_labels(out);
                    top.collect_labels(out);
                    out.push(label.clone());
                }
            }
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for e in &self.entries {
            match e {
                StackEntry::Step(s) => writeln!(f, "{:indent$}{s}", "", indent = depth * 2)?,
                StackEntry::Blend { label, base, top } => {
                    writeln!(f, "{:indent$}{label}", "", indent = depth * 2)?;
                    writeln!(f, "{:indent$}base:", "", indent = depth * 2 + 2)?;
                    base.write_indented(f, depth + 2)?;
                    writeln!(f, "{:indent$}top:", "", indent = depth * 2 + 2)?;
                    top.write_indented(f, depth + 2)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ProcessStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
