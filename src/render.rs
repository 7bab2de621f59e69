//! PDF rendering through an external converter.
//!
//! External programs are run through the [`CommandRunner`] trait so the
//! engine-fallback logic can be exercised without pandoc installed.

use crate::config::PdfConfig;
use crate::output::OutputFormatter;
use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Reasons a child process produced no exit status.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {} seconds", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
    #[error("Failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs external programs with a deadline.
pub trait CommandRunner {
    /// Runs `program` with `args`, capturing stdout and stderr.
    ///
    /// Must return [`RunError::TimedOut`] once `timeout` has elapsed.
    fn run(&self, program: &str, args: &[String], timeout: Duration)
    -> Result<CommandOutput, RunError>;

    /// Whether `program` can be found on the search path.
    fn is_available(&self, program: &str) -> bool {
        find_in_path(program).is_some()
    }
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RunError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Drain both pipes while waiting so a verbose child cannot stall.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        match child.wait_timeout(timeout) {
            Ok(Some(status)) => Ok(CommandOutput {
                code: status.code(),
                success: status.success(),
                stdout: join_output(stdout),
                stderr: join_output(stderr),
            }),
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(RunError::TimedOut {
                    program: program.to_string(),
                    timeout,
                })
            }
            Err(source) => {
                let _ = child.kill();
                Err(RunError::Wait {
                    program: program.to_string(),
                    source,
                })
            }
        }
    }
}

/// How long to wait for the pipe readers once the child has exited.
///
/// A background grandchild can keep the pipes open after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

fn drain<R: Read + Send + 'static>(mut stream: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = stream.read_to_end(&mut buffer);
        let _ = tx.send(String::from_utf8_lossy(&buffer).into_owned());
    });
    rx
}

fn join_output(reader: Option<Receiver<String>>) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    reader.recv_timeout(DRAIN_GRACE).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "pipe still held open after exit, dropping output");
        String::new()
    })
}

/// Looks `program` up in the directories listed in `PATH`.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths).find_map(|dir| {
        let probe = dir.join(program);
        if probe.is_file() {
            return Some(probe);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{}.exe", program));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

/// Errors from a rendering attempt.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{engine} conversion failed (exit code {code:?})")]
    Failed {
        engine: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("{engine} conversion timed out after {} seconds", .timeout.as_secs())]
    TimedOut { engine: String, timeout: Duration },
    #[error("Could not run the converter: {0}")]
    Launch(#[source] RunError),
}

impl RenderError {
    /// Truncated converter output attached to a failed attempt.
    pub fn diagnostics(&self) -> Option<(&str, &str)> {
        match self {
            RenderError::Failed { stdout, stderr, .. } => Some((stdout, stderr)),
            _ => None,
        }
    }
}

/// Successful rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderReport {
    pub output: PathBuf,
    /// Engine that produced the PDF.
    pub engine: String,
    /// Font passed to the engine, if it supports complex scripts.
    pub font: Option<String>,
    /// Whether the fallback engine was needed.
    pub fell_back: bool,
    pub size_bytes: Option<u64>,
}

/// Drives the converter for one document.
pub struct Renderer<'a, R: CommandRunner> {
    config: &'a PdfConfig,
    runner: &'a R,
}

impl<'a, R: CommandRunner> Renderer<'a, R> {
    pub fn new(config: &'a PdfConfig, runner: &'a R) -> Self {
        Self { config, runner }
    }

    /// Picks the first preferred font reported by the font query.
    ///
    /// Any failure of the query, including a timeout, yields the default font.
    pub fn detect_font(&self) -> String {
        let result = self.runner.run(
            &self.config.font_query_program,
            &self.config.font_query_args,
            self.config.font_query_timeout(),
        );

        let available = match result {
            Ok(output) => output.stdout,
            Err(e) => {
                tracing::debug!(error = %e, "font query failed, using default font");
                return self.config.default_font.clone();
            }
        };

        self.config
            .preferred_fonts
            .iter()
            .find(|font| available.contains(font.as_str()))
            .cloned()
            .unwrap_or_else(|| self.config.default_font.clone())
    }

    /// Converter arguments for one attempt.
    pub fn converter_args(
        &self,
        input: &Path,
        output: &Path,
        engine: &str,
        font: Option<&str>,
    ) -> Vec<String> {
        let mut args = vec![
            input.to_string_lossy().into_owned(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
            "--pdf-engine".to_string(),
            engine.to_string(),
            "-V".to_string(),
            format!("geometry:margin={}", self.config.margin),
            "-V".to_string(),
            format!("fontsize={}", self.config.font_size),
            "--toc".to_string(),
            format!("--toc-depth={}", self.config.toc_depth),
            "--number-sections".to_string(),
        ];

        if let Some(font) = font {
            args.push("-V".to_string());
            args.push(format!("{}={}", self.config.font_variable, font));
        }

        args
    }

    /// Renders `input` to `output` with `engine`.
    ///
    /// If `engine` is the configured first choice and the converter exits
    /// non-zero, the fallback engine is tried exactly once. Timeouts and launch
    /// failures are returned as-is.
    pub fn render(&self, input: &Path, output: &Path, engine: &str) -> Result<RenderReport, RenderError> {
        match self.attempt(input, output, engine) {
            Err(err @ RenderError::Failed { .. })
                if engine == self.config.engine && engine != self.config.fallback_engine =>
            {
                OutputFormatter::warning(&format!("{}", err));
                report_diagnostics(&err);
                OutputFormatter::info(&format!(
                    "Retrying with the {} engine...",
                    self.config.fallback_engine
                ));
                tracing::warn!(
                    primary = %engine,
                    fallback = %self.config.fallback_engine,
                    "primary engine failed, retrying once"
                );

                self.attempt(input, output, &self.config.fallback_engine)
                    .map(|report| RenderReport {
                        fell_back: true,
                        ..report
                    })
            }
            other => other,
        }
    }

    fn attempt(&self, input: &Path, output: &Path, engine: &str) -> Result<RenderReport, RenderError> {
        let font = self
            .config
            .supports_complex_script(engine)
            .then(|| self.detect_font());
        let args = self.converter_args(input, output, engine, font.as_deref());

        OutputFormatter::info(&format!("Converting to PDF with {}", engine));
        if let Some(font) = &font {
            OutputFormatter::plain(&format!("   Font: {}", font));
        }
        tracing::debug!(program = %self.config.converter, args = ?args, "running converter");

        let spinner = OutputFormatter::spinner(&format!("Running {}...", self.config.converter));
        let result = self
            .runner
            .run(&self.config.converter, &args, self.config.convert_timeout());
        spinner.finish_and_clear();

        let limit = self.config.diagnostic_limit;
        match result {
            Ok(out) if out.success => Ok(RenderReport {
                output: output.to_path_buf(),
                engine: engine.to_string(),
                font,
                fell_back: false,
                size_bytes: output.metadata().ok().map(|m| m.len()),
            }),
            Ok(out) => Err(RenderError::Failed {
                engine: engine.to_string(),
                code: out.code,
                stdout: truncate_chars(&out.stdout, limit),
                stderr: truncate_chars(&out.stderr, limit),
            }),
            Err(RunError::TimedOut { timeout, .. }) => Err(RenderError::TimedOut {
                engine: engine.to_string(),
                timeout,
            }),
            Err(e) => Err(RenderError::Launch(e)),
        }
    }
}

/// Prints the captured converter output of a failed attempt.
pub fn report_diagnostics(err: &RenderError) {
    if let Some((stdout, stderr)) = err.diagnostics() {
        if !stdout.trim().is_empty() {
            OutputFormatter::plain(&format!("  stdout: {}", stdout.trim_end()));
        }
        if !stderr.trim().is_empty() {
            OutputFormatter::plain(&format!("  stderr: {}", stderr.trim_end()));
        }
    }
}

/// Keeps at most `limit` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned results and records every call.
    #[derive(Default)]
    struct ScriptedRunner {
        fonts: Option<String>,
        converter_results: RefCell<VecDeque<Result<CommandOutput, RunError>>>,
        calls: RefCell<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedRunner {
        fn with_results(results: Vec<Result<CommandOutput, RunError>>) -> Self {
            Self {
                converter_results: RefCell::new(results.into()),
                ..Default::default()
            }
        }

        fn converter_engines(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .filter(|(program, _)| program == "pandoc")
                .map(|(_, args)| {
                    let pos = args.iter().position(|a| a == "--pdf-engine").unwrap();
                    args[pos + 1].clone()
                })
                .collect()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(
            &self,
            program: &str,
            args: &[String],
            timeout: Duration,
        ) -> Result<CommandOutput, RunError> {
            self.calls
                .borrow_mut()
                .push((program.to_string(), args.to_vec()));

            if program == "fc-list" {
                return match &self.fonts {
                    Some(fonts) => Ok(ok_output(fonts)),
                    None => Err(RunError::TimedOut {
                        program: program.to_string(),
                        timeout,
                    }),
                };
            }

            self.converter_results
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(ok_output("")))
        }

        fn is_available(&self, _program: &str) -> bool {
            true
        }
    }

    fn ok_output(stdout: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn failed_output(stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(43),
            success: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn timed_out() -> RunError {
        RunError::TimedOut {
            program: "pandoc".to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    #[test]
    fn test_detect_font_prefers_priority_order() {
        let config = PdfConfig::default();
        let runner = ScriptedRunner {
            fonts: Some(
                "/usr/share/fonts/wqy.ttc: WenQuanYi Micro Hei:style=Regular\n\
                 /usr/share/fonts/noto.ttc: Noto Serif CJK SC:style=Bold\n"
                    .to_string(),
            ),
            ..Default::default()
        };

        let renderer = Renderer::new(&config, &runner);
        assert_eq!(renderer.detect_font(), "Noto Serif CJK SC");
    }

    #[test]
    fn test_detect_font_falls_back_to_default() {
        let config = PdfConfig::default();

        let failing = ScriptedRunner::default();
        assert_eq!(Renderer::new(&config, &failing).detect_font(), "Noto Sans CJK SC");

        let unmatched = ScriptedRunner {
            fonts: Some("DejaVu Sans".to_string()),
            ..Default::default()
        };
        assert_eq!(Renderer::new(&config, &unmatched).detect_font(), "Noto Sans CJK SC");
    }

    #[test]
    fn test_converter_args() {
        let config = PdfConfig::default();
        let runner = ScriptedRunner::default();
        let renderer = Renderer::new(&config, &runner);

        let args = renderer.converter_args(
            Path::new("in.md"),
            Path::new("out.pdf"),
            "xelatex",
            Some("SimSun"),
        );
        assert_eq!(
            args,
            vec![
                "in.md",
                "-o",
                "out.pdf",
                "--pdf-engine",
                "xelatex",
                "-V",
                "geometry:margin=1in",
                "-V",
                "fontsize=12pt",
                "--toc",
                "--toc-depth=3",
                "--number-sections",
                "-V",
                "CJKmainfont=SimSun",
            ]
        );

        let plain = renderer.converter_args(Path::new("in.md"), Path::new("out.pdf"), "pdflatex", None);
        assert!(!plain.iter().any(|a| a.starts_with("CJKmainfont")));
    }

    #[test]
    fn test_render_success_first_try() {
        let config = PdfConfig::default();
        let runner = ScriptedRunner::with_results(vec![Ok(ok_output(""))]);

        let report = Renderer::new(&config, &runner)
            .render(Path::new("in.md"), Path::new("out.pdf"), "xelatex")
            .unwrap();

        assert_eq!(report.engine, "xelatex");
        assert_eq!(report.font.as_deref(), Some("Noto Sans CJK SC"));
        assert!(!report.fell_back);
        assert_eq!(runner.converter_engines(), vec!["xelatex"]);
    }

    #[test]
    fn test_render_falls_back_once_on_non_zero_exit() {
        let config = PdfConfig::default();
        let runner = ScriptedRunner::with_results(vec![
            Ok(failed_output("xelatex: font not found")),
            Ok(ok_output("")),
        ]);

        let report = Renderer::new(&config, &runner)
            .render(Path::new("in.md"), Path::new("out.pdf"), "xelatex")
            .unwrap();

        assert_eq!(report.engine, "lualatex");
        assert!(report.fell_back);
        assert_eq!(runner.converter_engines(), vec!["xelatex", "lualatex"]);
    }

    #[test]
    fn test_render_gives_up_after_fallback_fails() {
        let config = PdfConfig::default();
        let runner = ScriptedRunner::with_results(vec![
            Ok(failed_output("first")),
            Ok(failed_output("second")),
        ]);

        let err = Renderer::new(&config, &runner)
            .render(Path::new("in.md"), Path::new("out.pdf"), "xelatex")
            .unwrap_err();

        match &err {
            RenderError::Failed { engine, stderr, .. } => {
                assert_eq!(engine, "lualatex");
                assert_eq!(stderr, "second");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runner.converter_engines(), vec!["xelatex", "lualatex"]);
    }

    #[test]
    fn test_timeout_does_not_trigger_fallback() {
        let config = PdfConfig::default();
        let runner = ScriptedRunner::with_results(vec![Err(timed_out())]);

        let err = Renderer::new(&config, &runner)
            .render(Path::new("in.md"), Path::new("out.pdf"), "xelatex")
            .unwrap_err();

        assert!(matches!(err, RenderError::TimedOut { .. }));
        assert_eq!(runner.converter_engines(), vec!["xelatex"]);
    }

    #[test]
    fn test_non_primary_engine_is_not_retried() {
        let config = PdfConfig::default();
        let runner = ScriptedRunner::with_results(vec![Ok(failed_output("boom"))]);

        let err = Renderer::new(&config, &runner)
            .render(Path::new("in.md"), Path::new("out.pdf"), "lualatex")
            .unwrap_err();

        assert!(matches!(err, RenderError::Failed { .. }));
        assert_eq!(runner.converter_engines(), vec!["lualatex"]);
    }

    #[test]
    fn test_failure_output_is_truncated() {
        let config = PdfConfig {
            diagnostic_limit: 10,
            ..PdfConfig::default()
        };
        let long = "x".repeat(50);
        let runner = ScriptedRunner::with_results(vec![
            Ok(failed_output(&long)),
            Ok(failed_output(&long)),
        ]);

        let err = Renderer::new(&config, &runner)
            .render(Path::new("in.md"), Path::new("out.pdf"), "xelatex")
            .unwrap_err();

        let (_, stderr) = err.diagnostics().unwrap();
        assert_eq!(stderr, format!("{}…", "x".repeat(10)));
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("短文本", 10), "短文本");
        assert_eq!(truncate_chars("线性代数笔记", 4), "线性代数…");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_font_query_skipped_for_plain_engines() {
        let config = PdfConfig {
            engine: "pdflatex".to_string(),
            ..PdfConfig::default()
        };
        let runner = ScriptedRunner::with_results(vec![Ok(ok_output(""))]);

        let report = Renderer::new(&config, &runner)
            .render(Path::new("in.md"), Path::new("out.pdf"), "pdflatex")
            .unwrap();

        assert_eq!(report.font, None);
        assert!(runner.calls.borrow().iter().all(|(p, _)| p != "fc-list"));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_output() {
        let output = SystemRunner
            .run(
                "sh",
                &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
                Duration::from_secs(10),
            )
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert!(!output.success);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_times_out() {
        let result = SystemRunner.run(
            "sh",
            &["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        );
        assert!(matches!(result, Err(RunError::TimedOut { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_returns_despite_lingering_grandchild() {
        let started = std::time::Instant::now();
        let output = SystemRunner
            .run(
                "sh",
                &["-c".to_string(), "sleep 10 & echo started".to_string()],
                Duration::from_secs(30),
            )
            .unwrap();

        assert!(output.success);
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[test]
    fn test_missing_program_is_a_spawn_error() {
        let result = SystemRunner.run(
            "definitely-not-a-real-program-notetidy",
            &[],
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(RunError::Spawn { .. })));
        assert!(find_in_path("definitely-not-a-real-program-notetidy").is_none());
    }
}
