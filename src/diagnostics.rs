//! Diagnostic capture: every diagnostic the compiler reports is enriched
//! with a timestamp, the reporting thread's identity, and a call-site stack,
//! all captured synchronously on the reporting thread.

use crate::{compilers::Locale, files::FileObject};
use crossbeam_channel::{Receiver, Sender};
use std::{
    backtrace::Backtrace,
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::SystemTime,
};
use yansi::Color;

/// Sentinel for unknown positions, line, and column numbers.
pub const NO_POS: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Error,
    Warning,
    MandatoryWarning,
    Note,
    Other,
}

impl DiagnosticKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::MandatoryWarning => "MANDATORY_WARNING",
            Self::Note => "NOTE",
            Self::Other => "OTHER",
        }
    }

    pub const fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }

    /// Both plain and mandatory warnings count as warnings for the
    /// warnings-as-errors policy.
    pub const fn is_warning(self) -> bool {
        matches!(self, Self::Warning | Self::MandatoryWarning)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A diagnostic as the compiler reports it: kind, optional code and source,
/// character offsets, 1-based line/column, and a message renderable per
/// locale.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    kind: DiagnosticKind,
    code: Option<String>,
    source: Option<FileObject>,
    position: i64,
    start_position: i64,
    end_position: i64,
    line_number: i64,
    column_number: i64,
    message: String,
    localized: BTreeMap<String, String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            source: None,
            position: NO_POS,
            start_position: NO_POS,
            end_position: NO_POS,
            line_number: NO_POS,
            column_number: NO_POS,
            message: message.into(),
            localized: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: FileObject) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn at(mut self, line: i64, column: i64) -> Self {
        self.line_number = line;
        self.column_number = column;
        self
    }

    #[must_use]
    pub fn spanning(mut self, position: i64, start: i64, end: i64) -> Self {
        self.position = position;
        self.start_position = start;
        self.end_position = end;
        self
    }

    /// Attach a rendering of the message for a specific locale tag.
    #[must_use]
    pub fn with_localized_message(mut self, locale: &Locale, message: impl Into<String>) -> Self {
        self.localized.insert(locale.tag().to_owned(), message.into());
        self
    }

    pub fn kind(&self) -> DiagnosticKind {
        self.kind
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn source(&self) -> Option<&FileObject> {
        self.source.as_ref()
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn start_position(&self) -> i64 {
        self.start_position
    }

    pub fn end_position(&self) -> i64 {
        self.end_position
    }

    pub fn line_number(&self) -> i64 {
        self.line_number
    }

    pub fn column_number(&self) -> i64 {
        self.column_number
    }

    /// Render the message for `locale`, falling back to the default rendering.
    pub fn message(&self, locale: &Locale) -> &str {
        self.localized.get(locale.tag()).map(String::as_str).unwrap_or(&self.message)
    }
}

/// The identity of a reporting thread: a process-stable, comparable,
/// printable id plus the thread name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ThreadIdentity {
    pub id: u64,
    pub name: String,
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

impl ThreadIdentity {
    pub fn current() -> Self {
        let id = THREAD_ID.with(|id| *id);
        let name = std::thread::current()
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("thread-{id}"));
        Self { id, name }
    }
}

#[derive(Debug)]
struct TraceInner {
    diagnostic: Diagnostic,
    timestamp: SystemTime,
    thread: ThreadIdentity,
    stack: Vec<String>,
}

/// A [`Diagnostic`] enriched at report time. Immutable once constructed and
/// cheap to share across threads.
#[derive(Clone, Debug)]
pub struct TraceDiagnostic {
    inner: Arc<TraceInner>,
}

impl TraceDiagnostic {
    fn new(diagnostic: Diagnostic, timestamp: SystemTime, thread: ThreadIdentity, stack: Vec<String>) -> Self {
        Self { inner: Arc::new(TraceInner { diagnostic, timestamp, thread, stack }) }
    }

    pub fn diagnostic(&self) -> &Diagnostic {
        &self.inner.diagnostic
    }

    pub fn kind(&self) -> DiagnosticKind {
        self.inner.diagnostic.kind()
    }

    pub fn code(&self) -> Option<&str> {
        self.inner.diagnostic.code()
    }

    pub fn source(&self) -> Option<&FileObject> {
        self.inner.diagnostic.source()
    }

    pub fn message(&self, locale: &Locale) -> &str {
        self.inner.diagnostic.message(locale)
    }

    /// Wall-clock instant captured when the diagnostic was reported.
    pub fn timestamp(&self) -> SystemTime {
        self.inner.timestamp
    }

    pub fn thread_id(&self) -> u64 {
        self.inner.thread.id
    }

    pub fn thread_name(&self) -> &str {
        &self.inner.thread.name
    }

    /// The call-site stack captured on the reporting thread, outermost frames
    /// last.
    pub fn stack_trace(&self) -> &[String] {
        &self.inner.stack
    }
}

impl fmt::Display for TraceDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let diagnostic = &self.inner.diagnostic;
        let style = match diagnostic.kind() {
            DiagnosticKind::Error => Color::Red.style().bold(),
            k if k.is_warning() => Color::Yellow.style().bold(),
            _ => Color::White.style(),
        };
        write!(f, "{}", style.paint(diagnostic.kind().name()))?;
        if let Some(code) = diagnostic.code() {
            write!(f, " ({code})")?;
        }
        write!(f, ": {}", diagnostic.message(&Locale::root()))?;
        if let Some(source) = diagnostic.source() {
            write!(f, "\n  --> {}", source.name())?;
            if diagnostic.line_number() != NO_POS {
                write!(f, ":{}", diagnostic.line_number())?;
                if diagnostic.column_number() != NO_POS {
                    write!(f, ":{}", diagnostic.column_number())?;
                }
            }
        }
        Ok(())
    }
}

/// Whether (and how verbosely) a subsystem mirrors its activity into the
/// structured log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoggingMode {
    #[default]
    Disabled,
    Enabled,
    /// Like [`LoggingMode::Enabled`], with the captured call-site stack
    /// appended to each event.
    Stacktraces,
}

/// The diagnostic-listener capability the compiler reports into.
pub trait DiagnosticListener: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Thread-safe sink collecting every reported diagnostic in FIFO order.
#[derive(Debug)]
pub struct DiagnosticTracer {
    logging: LoggingMode,
    tx: Sender<TraceDiagnostic>,
    rx: Receiver<TraceDiagnostic>,
    seen: Mutex<Vec<TraceDiagnostic>>,
}

impl Default for DiagnosticTracer {
    fn default() -> Self {
        Self::new(LoggingMode::Disabled)
    }
}

impl DiagnosticTracer {
    pub fn new(logging: LoggingMode) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { logging, tx, rx, seen: Mutex::new(Vec::new()) }
    }

    pub fn logging(&self) -> LoggingMode {
        self.logging
    }

    /// An immutable snapshot of everything reported so far, in queue order.
    pub fn diagnostics(&self) -> Vec<TraceDiagnostic> {
        let mut seen = self.seen.lock().expect("diagnostic snapshot poisoned");
        seen.extend(self.rx.try_iter());
        seen.clone()
    }

    fn log(&self, trace: &TraceDiagnostic) {
        let mut message = trace.to_string();
        if self.logging == LoggingMode::Stacktraces {
            for frame in trace.stack_trace() {
                message.push_str("\n\t");
                message.push_str(frame);
            }
        }
        match trace.kind() {
            DiagnosticKind::Error => error!(target: "javac_harness::diagnostics", "{message}"),
            k if k.is_warning() => warn!(target: "javac_harness::diagnostics", "{message}"),
            _ => info!(target: "javac_harness::diagnostics", "{message}"),
        }
    }
}

impl DiagnosticListener for DiagnosticTracer {
    fn report(&self, diagnostic: Diagnostic) {
        // capture everything synchronously, on the reporting thread
        let timestamp = SystemTime::now();
        let thread = ThreadIdentity::current();
        let stack = capture_stack();
        let trace = TraceDiagnostic::new(diagnostic, timestamp, thread, stack);
        // cannot fail: the receiving half lives as long as the tracer
        let _ = self.tx.send(trace.clone());
        if self.logging != LoggingMode::Disabled {
            self.log(&trace);
        }
    }
}

fn capture_stack() -> Vec<String> {
    let backtrace = Backtrace::force_capture();
    backtrace
        .to_string()
        .lines()
        .map(|line| line.trim().to_owned())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn listener_report(tracer: &DiagnosticTracer, diagnostic: Diagnostic) {
        tracer.report(diagnostic);
    }

    #[test]
    fn reports_are_enriched_synchronously() {
        let tracer = DiagnosticTracer::default();
        let before = SystemTime::now();
        listener_report(&tracer, Diagnostic::new(DiagnosticKind::Error, "boom"));
        let after = SystemTime::now();

        let all = tracer.diagnostics();
        assert_eq!(all.len(), 1);
        let trace = &all[0];
        assert!(trace.timestamp() >= before && trace.timestamp() <= after);
        assert_eq!(trace.thread_name(), std::thread::current().name().unwrap());
        assert!(!trace.stack_trace().is_empty());
        assert_eq!(trace.message(&Locale::root()), "boom");
    }

    #[test]
    fn snapshots_are_immutable_and_fifo() {
        let tracer = DiagnosticTracer::default();
        for n in 0..3 {
            tracer.report(Diagnostic::new(DiagnosticKind::Note, format!("n{n}")));
        }
        let first = tracer.diagnostics();
        assert_eq!(first.len(), 3);
        tracer.report(Diagnostic::new(DiagnosticKind::Note, "late"));
        assert_eq!(first.len(), 3);
        let second = tracer.diagnostics();
        assert_eq!(second.len(), 4);
        let messages: Vec<_> =
            second.iter().map(|t| t.message(&Locale::root()).to_owned()).collect();
        assert_eq!(messages, vec!["n0", "n1", "n2", "late"]);
    }

    #[test]
    fn per_thread_report_order_is_preserved() {
        let tracer = Arc::new(DiagnosticTracer::default());
        let mut handles = Vec::new();
        for t in 0..4 {
            let tracer = tracer.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("reporter-{t}"))
                    .spawn(move || {
                        for n in 0..25 {
                            tracer.report(Diagnostic::new(
                                DiagnosticKind::Note,
                                format!("{t}:{n}"),
                            ));
                        }
                    })
                    .unwrap(),
            );
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let all = tracer.diagnostics();
        assert_eq!(all.len(), 100);
        for t in 0..4 {
            let thread_messages: Vec<_> = all
                .iter()
                .filter(|d| d.thread_name() == format!("reporter-{t}"))
                .map(|d| d.message(&Locale::root()).to_owned())
                .collect();
            let expected: Vec<_> = (0..25).map(|n| format!("{t}:{n}")).collect();
            assert_eq!(thread_messages, expected);
        }
    }

    #[test]
    fn localized_messages_render_per_locale() {
        let german = Locale::new("de");
        let diagnostic = Diagnostic::new(DiagnosticKind::Warning, "deprecated")
            .with_localized_message(&german, "veraltet");
        assert_eq!(diagnostic.message(&Locale::root()), "deprecated");
        assert_eq!(diagnostic.message(&german), "veraltet");
    }

    #[test]
    fn thread_identities_are_stable_and_distinct() {
        let here = ThreadIdentity::current();
        assert_eq!(here, ThreadIdentity::current());
        let there = std::thread::spawn(ThreadIdentity::current).join().unwrap();
        assert_ne!(here.id, there.id);
    }
}
