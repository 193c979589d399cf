//! yt-dlp fetch engine.

use async_trait::async_trait;
use media_sources::PostProcessor;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::capture::ErrorCapture;
use super::traits::{FetchEngine, FetchMetadata, FetchOutput, FetchRequest};
use crate::downloader::output::list_files;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YtDlpEngineConfig {
    pub binary_path: String,
    /// Appended before the locator.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for YtDlpEngineConfig {
    fn default() -> Self {
        Self {
            binary_path: "yt-dlp".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Fetch engine backed by the yt-dlp binary.
///
/// The process is spawned with an argument vector (never a shell) and is
/// killed when the fetch future is dropped.
pub struct YtDlpEngine {
    config: YtDlpEngineConfig,
}

impl YtDlpEngine {
    pub fn new(config: YtDlpEngineConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, request: &FetchRequest) -> Vec<String> {
        let options = &request.options;
        let mut args: Vec<String> = [
            "--ignore-errors",
            "--no-playlist",
            "--newline",
            "--no-progress",
            "--no-simulate",
            "--dump-json",
            // --dump-json implies --quiet, which would hide size-limit aborts.
            "--no-quiet",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        args.push("--paths".to_string());
        args.push(request.work_dir.to_string_lossy().into_owned());
        args.extend(["-o".to_string(), options.output_template.clone()]);
        args.extend(["-f".to_string(), options.format.clone()]);

        if let Some(ref container) = options.merge_output_format {
            args.extend(["--merge-output-format".to_string(), container.clone()]);
        }
        if let Some(max) = options.max_filesize {
            args.extend(["--max-filesize".to_string(), max.to_string()]);
        }
        if options.restrict_filenames {
            args.push("--restrict-filenames".to_string());
        }
        if let Some(trim) = options.trim_file_name {
            args.extend(["--trim-filenames".to_string(), trim.to_string()]);
        }
        if options.write_thumbnail {
            args.push("--write-thumbnail".to_string());
        }

        let mut embed_metadata = options.embed_metadata;
        for pp in &options.post_processors {
            match pp {
                PostProcessor::ExtractAudio { codec, quality } => args.extend([
                    "--extract-audio".to_string(),
                    "--audio-format".to_string(),
                    codec.clone(),
                    "--audio-quality".to_string(),
                    quality.clone(),
                ]),
                PostProcessor::RemuxVideo { container } => {
                    args.extend(["--remux-video".to_string(), container.clone()])
                }
                PostProcessor::ConvertThumbnail { format } => {
                    args.extend(["--convert-thumbnails".to_string(), format.clone()])
                }
                PostProcessor::EmbedThumbnail => args.push("--embed-thumbnail".to_string()),
                PostProcessor::EmbedMetadata => embed_metadata = true,
            }
        }
        if embed_metadata {
            args.push("--embed-metadata".to_string());
        }

        for (key, value) in &options.headers {
            args.extend(["--add-header".to_string(), format!("{key}:{value}")]);
        }

        if let Some(ref cookies) = request.credential_file {
            args.extend([
                "--cookies".to_string(),
                cookies.to_string_lossy().into_owned(),
            ]);
        }

        args.extend(self.config.extra_args.iter().cloned());

        // Everything after "--" is positional, so a locator can never be read as a flag.
        args.push("--".to_string());
        args.push(request.locator.as_str().to_string());
        args
    }

    /// Merge one `--dump-json` line into the metadata map. Later lines win.
    fn merge_metadata(metadata: &mut FetchMetadata, line: &str) {
        let line = line.trim();
        if !line.starts_with('{') {
            return;
        }
        match serde_json::from_str::<FetchMetadata>(line) {
            Ok(info) => {
                for key in ["id", "title", "duration", "uploader", "webpage_url", "ext", "extractor"] {
                    if let Some(value) = info.get(key) {
                        metadata.insert(key.to_string(), value.clone());
                    }
                }
            }
            Err(e) => debug!(error = %e, "Ignoring unparsable info line"),
        }
    }
}

/// Feed every line of `reader` to `f` until EOF. Invalid UTF-8 is replaced
/// rather than ending the loop, so the pipe keeps draining.
async fn for_each_line<R: AsyncBufRead + Unpin>(mut reader: R, mut f: impl FnMut(&str)) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => f(String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n'])),
            Err(e) => {
                debug!(error = %e, "Engine output stream closed");
                break;
            }
        }
    }
}

#[async_trait]
impl FetchEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutput> {
        let args = self.build_args(&request);
        debug!(
            binary = %self.config.binary_path,
            locator = %request.locator,
            work_dir = %request.work_dir.display(),
            "Spawning fetch engine"
        );

        let mut child = Command::new(&self.config.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::io_path("spawn", &self.config.binary_path, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Other("engine stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Other("engine stderr not captured".to_string()))?;

        let read_stdout = async {
            let mut metadata = FetchMetadata::new();
            let mut capture = ErrorCapture::new();
            for_each_line(BufReader::new(stdout), |line| {
                if line.trim_start().starts_with('{') {
                    Self::merge_metadata(&mut metadata, line);
                } else {
                    capture.observe(line);
                }
            })
            .await;
            (metadata, capture)
        };

        let read_stderr = async {
            let mut capture = ErrorCapture::new();
            for_each_line(BufReader::new(stderr), |line| capture.observe(line)).await;
            capture
        };

        let ((metadata, stdout_capture), mut capture, status) =
            tokio::join!(read_stdout, read_stderr, child.wait());
        let status = status?;
        capture.absorb(stdout_capture);

        let mut error = capture.into_error();
        if error.is_none() && !status.success() {
            warn!(?status, "Fetch engine exited unsuccessfully without an error line");
            error = Some(format!("ERROR: engine exited with {status}"));
        }

        let files = list_files(&request.work_dir, request.credential_file.as_deref()).await?;

        Ok(FetchOutput {
            files,
            work_dir: request.work_dir,
            error,
            metadata,
        })
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.config.binary_path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|s| s.success())
    }
}
