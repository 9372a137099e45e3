//! A small indent-tracking string buffer, the same shape every emitter
//! writes through so nested blocks never hand-roll their own spacing.

use std::fmt::Write as _;

#[derive(Debug, Default)]
pub struct Writer {
    buf: String,
    indent: usize,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.buf.push_str("    ");
        }
        self.buf.push_str(text.as_ref());
        self.buf.push('\n');
    }

    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn block(&mut self, open: impl AsRef<str>, body: impl FnOnce(&mut Self)) {
        self.line(format!("{} {{", open.as_ref()));
        self.indent();
        body(self);
        self.dedent();
        self.line("}");
    }

    pub fn raw(&mut self, text: impl AsRef<str>) {
        let _ = write!(self.buf, "{}", text.as_ref());
    }

    pub fn finish(self) -> String {
        self.buf
    }
}
