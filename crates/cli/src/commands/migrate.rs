use crate::commands::session::{load_config, open_pool, runtime};
use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match load_config() {
        Ok(config) => config,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("migrate", error_class, message, exit_code);
        }
    };

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("migrate", error_class, message, exit_code);
        }
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        pool.close().await;
        Ok::<(), crate::commands::CommandFailure>(())
    });

    match result {
        Ok(()) => {
            tracing::info!(event_name = "cli.migrate.applied", "applied pending migrations");
            CommandResult::success("migrate", "applied pending migrations")
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
