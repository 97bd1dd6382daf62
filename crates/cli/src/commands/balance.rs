use scoutpoints_core::codes::RandomCodeGenerator;
use scoutpoints_core::config::{AppConfig, LoadOptions};
use scoutpoints_core::domain::member::GroupId;
use scoutpoints_core::engine::{RedemptionEngine, RedemptionPolicy};
use scoutpoints_db::{
    connect_with_settings, SqlMemberBalanceStore, SqlOfferCatalog, SqlRedemptionStore,
};

use crate::commands::CommandResult;
use crate::init_logging;

pub fn run(group: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "balance",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config.logging);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "balance",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let engine = RedemptionEngine::new(
            SqlOfferCatalog::new(pool.clone()),
            SqlMemberBalanceStore::new(pool.clone()),
            SqlRedemptionStore::new(pool.clone()),
            RandomCodeGenerator::new(config.redemption.code_length as usize),
            RedemptionPolicy::from(&config.redemption),
        );

        let balance = engine
            .group_balance(&GroupId(group.to_string()))
            .await
            .map_err(|error| ("query", error.to_string(), 5u8))?;

        pool.close().await;
        Ok::<u64, (&'static str, String, u8)>(balance)
    });

    match result {
        Ok(balance) => CommandResult::success(
            "balance",
            format!("group `{group}` can spend {balance} points"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("balance", error_class, message, exit_code)
        }
    }
}
