//! Converter backed by external renderers.
//!
//! | Step | Command |
//! |---|---|
//! | Score → PDF | `mscore --export-to out.pdf score.mscx` |
//! | PDF → slides | `pdf2svg in.pdf out/%02d.svg all` |
//! | PDF → piano pages | `pdfinfo in.pdf`, then per page `pdftops -eps -f N -l N in.pdf out/NN.eps` |
//!
//! Every invocation blocks its worker until the child exits or the configured
//! timeout expires, in which case the child is killed. stdout and stderr are
//! drained on helper threads so a chatty renderer can't fill a pipe and stall.

use super::backend::{ConvertError, Converter};
use crate::config::ConvertersConfig;
use crate::naming::{list_page_images, page_file_name, page_file_pattern};
use crate::types::Chain;
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Check that every configured renderer can be found on `PATH`.
///
/// Reports all missing executables at once.
pub fn preflight(config: &ConvertersConfig) -> Result<(), ConvertError> {
    let missing: Vec<String> = config
        .executables()
        .into_iter()
        .filter(|exe| which::which(exe).is_err())
        .map(String::from)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConvertError::Unavailable(missing))
    }
}

/// Renders through MuseScore and the poppler command line tools.
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    mscore: String,
    pdf2svg: String,
    pdfinfo: String,
    pdftops: String,
    timeout: Option<Duration>,
}

/// What a finished child left behind.
struct Finished {
    stdout: String,
}

impl ExternalConverter {
    pub fn new(config: &ConvertersConfig) -> Self {
        Self {
            mscore: config.mscore.clone(),
            pdf2svg: config.pdf2svg.clone(),
            pdfinfo: config.pdfinfo.clone(),
            pdftops: config.pdftops.clone(),
            timeout: config.timeout(),
        }
    }

    fn run(&self, program: &str, args: &[&OsStr]) -> Result<Finished, ConvertError> {
        debug!(program, args = ?args, "spawning converter");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ConvertError::SpawnFailed {
                program: program.to_string(),
                source: e,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = wait_with_timeout(&mut child, self.timeout, program)?;
        let stdout = join(stdout);
        let stderr = join(stderr);

        if !status.success() {
            warn!(program, %status, stderr = %stderr.trim(), "converter failed");
            return Err(ConvertError::ProcessFailed {
                program: program.to_string(),
                status,
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            debug!(program, stderr = %stderr.trim(), "converter stderr");
        }
        Ok(Finished { stdout })
    }

    fn page_count(&self, pdf: &Path) -> Result<u32, ConvertError> {
        let info = self.run(&self.pdfinfo, &[pdf.as_os_str()])?;
        parse_page_count(&info.stdout).ok_or_else(|| ConvertError::PageCount(pdf.to_path_buf()))
    }

    fn slides(&self, pdf: &Path, out_dir: &Path) -> Result<(), ConvertError> {
        let pattern = out_dir.join(page_file_pattern(Chain::Slides.image_extension()));
        self.run(
            &self.pdf2svg,
            &[pdf.as_os_str(), pattern.as_os_str(), OsStr::new("all")],
        )?;
        if list_page_images(out_dir, Chain::Slides.image_extension())?.is_empty() {
            return Err(ConvertError::MissingOutput {
                program: self.pdf2svg.clone(),
                path: out_dir.to_path_buf(),
            });
        }
        Ok(())
    }

    fn piano_pages(&self, pdf: &Path, out_dir: &Path) -> Result<(), ConvertError> {
        let pages = self.page_count(pdf)?;
        for page in 1..=pages {
            let number = OsString::from(page.to_string());
            let output = out_dir.join(page_file_name(page, Chain::Piano.image_extension()));
            self.run(
                &self.pdftops,
                &[
                    OsStr::new("-eps"),
                    OsStr::new("-f"),
                    number.as_os_str(),
                    OsStr::new("-l"),
                    number.as_os_str(),
                    pdf.as_os_str(),
                    output.as_os_str(),
                ],
            )?;
            if !output.is_file() {
                return Err(ConvertError::MissingOutput {
                    program: self.pdftops.clone(),
                    path: output,
                });
            }
        }
        Ok(())
    }
}

impl Converter for ExternalConverter {
    fn export_pdf(&self, source: &Path, pdf: &Path) -> Result<(), ConvertError> {
        self.run(
            &self.mscore,
            &[OsStr::new("--export-to"), pdf.as_os_str(), source.as_os_str()],
        )?;
        // MuseScore exits 0 on some export errors; the file is the real signal.
        if !pdf.is_file() {
            return Err(ConvertError::MissingOutput {
                program: self.mscore.clone(),
                path: pdf.to_path_buf(),
            });
        }
        Ok(())
    }

    fn pdf_to_images(&self, chain: Chain, pdf: &Path, out_dir: &Path) -> Result<(), ConvertError> {
        match chain {
            Chain::Slides => self.slides(pdf, out_dir),
            Chain::Piano => self.piano_pages(pdf, out_dir),
        }
    }
}

/// Read the `Pages:` line of `pdfinfo` output.
fn parse_page_count(pdfinfo_output: &str) -> Option<u32> {
    pdfinfo_output
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|n| n.trim().parse().ok())
        .filter(|&n| n > 0)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Poll `child` until it exits. With a timeout, kill it once the deadline
/// passes.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
    program: &str,
) -> Result<ExitStatus, ConvertError> {
    let Some(timeout) = timeout else {
        return child.wait().map_err(|e| ConvertError::SpawnFailed {
            program: program.to_string(),
            source: e,
        });
    };

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(program, timeout_secs = timeout.as_secs(), "converter killed");
                    return Err(ConvertError::Timeout {
                        program: program.to_string(),
                        timeout,
                    });
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                return Err(ConvertError::SpawnFailed {
                    program: program.to_string(),
                    source: e,
                });
            }
        }
    }
}
