//! Stand-in registration engine shared by the strategy tests.

#![allow(dead_code)]

use async_trait::async_trait;
use regstrategy::core::config::EngineConfig;
use regstrategy::core::error::AppError;
use regstrategy::core::strategy::{
    CancelSource, CancelToken, ProcessOutput, ProcessRequest, ProcessRunner, RegistrationEngine,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Writes `result.0.mhd` into the `-out` folder, with the moving image path as
/// its contents, unless the folder is listed in `failing`.
#[derive(Default)]
pub struct FakeEngine {
    pub calls: Mutex<Vec<ProcessRequest>>,
    failing: Vec<PathBuf>,
    cancel_on_first_call: Mutex<Option<CancelSource>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_for(folders: &[PathBuf]) -> Arc<Self> {
        Arc::new(Self {
            failing: folders.to_vec(),
            ..Self::default()
        })
    }

    pub fn cancelling(source: CancelSource) -> Arc<Self> {
        Arc::new(Self {
            cancel_on_first_call: Mutex::new(Some(source)),
            ..Self::default()
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Output folders in invocation order.
    pub fn output_folders(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|request| arg_after(request, "-out"))
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for FakeEngine {
    async fn run(
        &self,
        request: &ProcessRequest,
        _cancel: &CancelToken,
    ) -> Result<ProcessOutput, AppError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(source) = self.cancel_on_first_call.lock().unwrap().take() {
            source.cancel();
        }

        let output_folder = arg_after(request, "-out");
        if self.failing.contains(&output_folder) {
            return Ok(ProcessOutput {
                stdout: Vec::new(),
                stderr: b"itk::ExceptionObject: Too many samples map outside moving image buffer\n"
                    .to_vec(),
                exit_code: 1,
            });
        }

        let moving = arg_after(request, "-m");
        fs::write(
            output_folder.join("result.0.mhd"),
            moving.display().to_string(),
        )?;
        Ok(ProcessOutput {
            stdout: b"Total time elapsed: 0.1s\n".to_vec(),
            stderr: Vec::new(),
            exit_code: 0,
        })
    }
}

pub fn arg_after(request: &ProcessRequest, flag: &str) -> PathBuf {
    let position = request
        .args
        .iter()
        .position(|arg| arg == flag)
        .unwrap_or_else(|| panic!("missing {} in {:?}", flag, request.args));
    PathBuf::from(&request.args[position + 1])
}

pub fn engine_with(runner: Arc<FakeEngine>) -> RegistrationEngine {
    RegistrationEngine::with_runner(EngineConfig::default(), runner)
}

pub fn write_volume(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"ObjectType = Image\nNDims = 3\n").unwrap();
}

pub const RIGID_PARAMETERS: &str = "(Transform \"EulerTransform\")\n(NumberOfResolutions 4)\n";
