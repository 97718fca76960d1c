//! Stdout guard: keeps pinentry-gate's own output off the protocol stream.
//!
//! stdout carries the Assuan conversation with gpg-agent. A stray print
//! corrupts the session and may put a PIN somewhere it does not belong.
//!
//! ## Implemented Lints
//!
//! - `NO_STDIO`: Forbids `print!`, `println!`, `eprint!`, `eprintln!` and
//!   `dbg!`. Diagnostics go through `GateLog`.

#![feature(rustc_private)]
#![warn(unused_extern_crates)]

extern crate rustc_ast;
extern crate rustc_lint;
extern crate rustc_session;
extern crate rustc_span;

use rustc_ast::{Expr, ExprKind, MacCall, Stmt, StmtKind};
use rustc_lint::{EarlyContext, EarlyLintPass, LintContext};
use rustc_session::{declare_lint_pass, declare_tool_lint};
use rustc_span::Span;

declare_tool_lint! {
    /// **What it does:** Forbids the standard printing macros.
    ///
    /// **Why is this bad?** `print!` and `println!` write into the Assuan
    /// stream and break the session with gpg-agent. `eprint!`, `eprintln!`
    /// and `dbg!` bypass the diagnostic log and its redaction.
    ///
    /// **Known problems:** Writing to `io::stderr()` explicitly is not
    /// caught; it is reserved for startup failures before the log is open.
    ///
    /// **Example:**
    /// ```rust,ignore
    /// // Bad
    /// println!("released PIN for {}", label);
    /// dbg!(&settings);
    ///
    /// // Good
    /// log.info(format_args!("released PIN for {}", label));
    /// ```
    pub stdout_guard::NO_STDIO,
    Deny,
    "use of print!, println!, eprint!, eprintln! or dbg!; use GateLog instead"
}

declare_lint_pass!(NoStdio => [NO_STDIO]);

impl EarlyLintPass for NoStdio {
    fn check_expr(&mut self, cx: &EarlyContext<'_>, expr: &Expr) {
        if let ExprKind::MacCall(mac) = &expr.kind {
            check_macro(cx, mac, expr.span);
        }
    }

    fn check_stmt(&mut self, cx: &EarlyContext<'_>, stmt: &Stmt) {
        if let StmtKind::MacCall(mac) = &stmt.kind {
            check_macro(cx, &mac.mac, stmt.span);
        }
    }
}

fn check_macro(cx: &EarlyContext<'_>, mac: &MacCall, span: Span) {
    let path = &mac.path;

    if path.segments.len() != 1 {
        return;
    }

    let (help, note) = match path.segments[0].ident.name.as_str() {
        "print" | "println" => (
            "log through `GateLog` instead",
            "stdout carries the Assuan protocol; extra output breaks the session",
        ),
        "eprint" | "eprintln" => (
            "log through `GateLog` instead",
            "stderr output bypasses the diagnostic log",
        ),
        "dbg" => (
            "log through `GateLog::debug` instead",
            "`dbg!` prints values unredacted",
        ),
        _ => return,
    };

    cx.span_lint(NO_STDIO, span, |diag| {
        diag.help(help);
        diag.note(note);
    });
}

#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub extern "C" fn register_lints(_sess: &rustc_session::Session, lint_store: &mut rustc_lint::LintStore) {
    lint_store.register_lints(&[&NO_STDIO]);
    lint_store.register_early_pass(|| Box::new(NoStdio));
}

#[unsafe(no_mangle)]
pub fn dylint_version() -> *mut std::os::raw::c_char {
    std::ffi::CString::new(dylint_linting::DYLINT_VERSION)
        .expect("version string contains null byte")
        .into_raw()
}
