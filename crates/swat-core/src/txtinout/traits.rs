use super::TxtInOut;
use crate::domain::SwatResult;

/// Runs the model inside a prepared working directory.
pub trait ModelExecutor: Send + Sync {
    fn execute(&self, txtinout: &TxtInOut) -> SwatResult<()>;
}

/// Spawns the directory's SWAT+ executable as a blocking subprocess.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessExecutor;

impl ModelExecutor for SubprocessExecutor {
    fn execute(&self, txtinout: &TxtInOut) -> SwatResult<()> {
        txtinout.run_executable()
    }
}

#[cfg(test)]
mod tests {
    use super::ModelExecutor;
    use crate::domain::{SwatError, SwatErrorCategory, SwatResult};
    use crate::txtinout::TxtInOut;
    use crate::txtinout::test_support::write_txtinout;
    use tempfile::TempDir;

    struct FailingExecutor;

    impl ModelExecutor for FailingExecutor {
        fn execute(&self, _txtinout: &TxtInOut) -> SwatResult<()> {
            Err(SwatError::execution("RUN.MODEL_EXIT", "model execution failed"))
        }
    }

    #[test]
    fn executor_errors_use_shared_error_types() {
        let temp = TempDir::new().expect("tempdir should be created");
        write_txtinout(temp.path());
        let txtinout = TxtInOut::new(temp.path()).expect("controller should build");

        let executor: &dyn ModelExecutor = &FailingExecutor;
        let error = executor.execute(&txtinout).expect_err("executor should fail");
        assert_eq!(error.category(), SwatErrorCategory::ExecutionError);
        assert_eq!(error.exit_code(), 4);
        assert_eq!(error.placeholder(), "RUN.MODEL_EXIT");
    }
}
