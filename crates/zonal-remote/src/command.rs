//! Run an external program as the statistics engine.
//!
//! This is how a scripted engine (for example a small wrapper around a cloud
//! raster API) is plugged in. Arguments are templates; the placeholders below
//! are substituted per attempt:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{output}` | path the raw CSV must be written to |
//! | `{aoi}` | AOI reference |
//! | `{raster}` / `{zones}` | dataset assets |
//! | `{scale}` | ground resolution in meters |
//! | `{bin_min}` / `{bin_max}` / `{bin_step}` / `{hist_steps}` | histogram bins |
//! | `{projection}` | projection identifier |
//! | `{tile_scale}` | resource multiplier |
//!
//! The same values are exported as `ZONAL_*` environment variables. Whatever
//! the program prints is returned as job messages.

use crate::request::{JobOutput, StatsClient, StatsRequest};
use crate::{RemoteError, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// External-program statistics client.
#[derive(Debug, Clone)]
pub struct CommandStatsClient {
    program: String,
    args: Vec<String>,
}

impl CommandStatsClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument template.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several argument templates.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Substitution table for one job.
    fn variables(request: &StatsRequest, output: &Path) -> Vec<(&'static str, String)> {
        vec![
            ("output", output.display().to_string()),
            ("aoi", request.aoi.clone()),
            ("raster", request.raster.clone()),
            ("zones", request.zones.clone()),
            ("scale", request.scale.to_string()),
            ("bin_min", request.bin_min.to_string()),
            ("bin_max", request.bin_max.to_string()),
            ("bin_step", request.bin_step.to_string()),
            ("hist_steps", request.hist_steps.to_string()),
            ("projection", request.projection.clone()),
            ("tile_scale", request.resource_multiplier.to_string()),
        ]
    }

    /// Arguments with placeholders filled in.
    pub fn render_args(&self, request: &StatsRequest, output: &Path) -> Vec<String> {
        let vars = Self::variables(request, output);
        self.args
            .iter()
            .map(|template| {
                vars.iter().fold(template.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{}}}", key), value)
                })
            })
            .collect()
    }
}

impl StatsClient for CommandStatsClient {
    fn request(&self, request: &StatsRequest, output: &Path) -> Result<JobOutput> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let args = self.render_args(request, output);
        debug!("Running {} {:?}", self.program, args);

        let mut command = Command::new(&self.program);
        command.args(&args);
        for (key, value) in Self::variables(request, output) {
            command.env(format!("ZONAL_{}", key.to_ascii_uppercase()), value);
        }

        let result = command.output().map_err(|source| RemoteError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let mut text = String::from_utf8_lossy(&result.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&result.stderr));
        let messages: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        if !result.status.success() {
            return Err(RemoteError::CommandFailed {
                program: self.program.clone(),
                code: result.status.code(),
                output: messages.join("\n"),
            });
        }

        Ok(JobOutput { messages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::DatasetRef;
    use std::path::PathBuf;
    use zonal_core::BinConfig;

    fn request() -> StatsRequest {
        StatsRequest::new("Kenya", &DatasetRef::default(), &BinConfig::with_step(2), 100.0).with_multiplier(4)
    }

    #[test]
    fn test_render_args() {
        let client = CommandStatsClient::new("python3")
            .arg("zonal.py")
            .args(["--out={output}", "--tile-scale", "{tile_scale}", "--steps={hist_steps}", "{unknown}"]);
        let args = client.render_args(&request(), &PathBuf::from("/tmp/k/raw.csv"));
        assert_eq!(
            args,
            vec!["zonal.py", "--out=/tmp/k/raw.csv", "--tile-scale", "4", "--steps=50", "{unknown}"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_program_and_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("raw.csv");
        let client = CommandStatsClient::new("sh").arg("-c").arg(
            "echo \"tile_scale=$ZONAL_TILE_SCALE\"; printf 'label,histogram\\n41,\"[[0, 1]]\"\\n' > \"$ZONAL_OUTPUT\"",
        );

        let job = client.request(&request(), &output).unwrap();
        assert_eq!(job.messages, vec!["tile_scale=4".to_string()]);
        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.starts_with("label,histogram"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program() {
        let dir = tempfile::tempdir().unwrap();
        let client = CommandStatsClient::new("sh").arg("-c").arg("echo 'Computation timed out.'; exit 3");
        let err = client.request(&request(), &dir.path().join("raw.csv")).unwrap_err();
        match err {
            RemoteError::CommandFailed { code, output, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(output, "Computation timed out.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let client = CommandStatsClient::new("zonal-engine-that-does-not-exist");
        assert!(matches!(
            client.request(&request(), &dir.path().join("raw.csv")),
            Err(RemoteError::Spawn { .. })
        ));
    }
}
