//! tweet-mirror - CLI entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use tweet_mirror::{
    api::{ListSource, XApi},
    cli::Args,
    config::{validate_config, Config},
    error::{exit_codes, Error, Result},
    output::{
        create_spinner, print_config_summary, print_error, print_failure_summary, print_info,
        print_warning,
    },
    pipeline::{mirror_list, mirror_user, FailedJob, RunMemos},
    store::Db,
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            print_error(&format!("{}", e));
            match e {
                Error::Config(_) | Error::ConfigValidation { .. } | Error::MissingConfig(_) => {
                    ExitCode::from(exit_codes::CONFIG_ERROR as u8)
                }
                Error::Authentication(_)
                | Error::Api(_)
                | Error::AccountNotFound(_)
                | Error::ListNotFound(_)
                | Error::RateLimited { .. }
                | Error::Status { .. } => ExitCode::from(exit_codes::API_ERROR as u8),
                Error::Download(_) => ExitCode::from(exit_codes::DOWNLOAD_ERROR as u8),
                _ => ExitCode::from(exit_codes::UNEXPECTED_ERROR as u8),
            }
        }
    }
}

async fn run() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).with_target(false).init();

    // Load configuration
    let config_path = args.config.clone();
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        print_warning(&format!(
            "Configuration file not found: {}",
            config_path.display()
        ));
        print_info("Using default configuration with CLI arguments");
        Config::default()
    };

    // Merge CLI arguments into config
    args.merge_into_config(&mut config);

    // Validate configuration
    validate_config(&config)?;

    let targets: Vec<String> = config
        .targets
        .screen_names
        .iter()
        .map(|name| format!("@{}", name.trim_start_matches('@')))
        .chain(config.targets.list_ids.iter().map(|id| format!("list {}", id)))
        .chain(
            config
                .targets
                .following_of
                .iter()
                .map(|name| format!("following of @{}", name.trim_start_matches('@'))),
        )
        .collect();
    print_config_summary(&targets, &config.download_directory().display().to_string());

    // Log in and verify the session
    print_info("Connecting...");
    let (api, screen_name) = XApi::login(
        &config.account.cookie,
        &config.account.auth_token,
        &config.client_options(),
    )
    .await?;
    print_info(&format!("Logged in as: @{}", screen_name));
    let api = Arc::new(api);

    let db = Db::open_default().await?;

    // Ctrl-C trips the cooperative cancel; in-flight work finishes.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                print_warning("Interrupt received, finishing in-flight work...");
                cancel.cancel();
            }
        });
    }

    let memos = Arc::new(RunMemos::new());
    let options = config.pipeline_options();
    let users_dir = config.users_directory();
    let lists_dir = config.lists_directory();

    let mut failures: Vec<FailedJob> = Vec::new();
    let mut failed_targets = 0usize;

    for name in &config.targets.screen_names {
        if cancel.is_cancelled() {
            break;
        }
        let name = name.trim_start_matches('@');
        let spinner = create_spinner(&format!("Mirroring @{}", name));
        let result = async {
            let account = api.get_user_by_screen_name(name).await?;
            mirror_user(
                api.clone(),
                db.clone(),
                account,
                &users_dir,
                memos.clone(),
                cancel.clone(),
                &options,
            )
            .await
        }
        .await;
        spinner.finish_and_clear();

        match result {
            Ok(mut batch) => failures.append(&mut batch),
            Err(e) => {
                print_error(&format!("Failed to mirror @{}: {}", name, e));
                failed_targets += 1;
            }
        }
    }

    for id in &config.targets.list_ids {
        if cancel.is_cancelled() {
            break;
        }
        let spinner = create_spinner(&format!("Mirroring list {}", id));
        let result = async {
            let info = api.get_list(*id).await?;
            mirror_list(
                api.clone(),
                db.clone(),
                ListSource::List(info),
                &lists_dir,
                &users_dir,
                memos.clone(),
                cancel.clone(),
                &options,
            )
            .await
        }
        .await;
        spinner.finish_and_clear();

        match result {
            Ok(mut batch) => failures.append(&mut batch),
            Err(e) => {
                print_error(&format!("Failed to mirror list {}: {}", id, e));
                failed_targets += 1;
            }
        }
    }

    for name in &config.targets.following_of {
        if cancel.is_cancelled() {
            break;
        }
        let name = name.trim_start_matches('@');
        let spinner = create_spinner(&format!("Mirroring accounts @{} follows", name));
        let result = async {
            let account = api.get_user_by_screen_name(name).await?;
            mirror_list(
                api.clone(),
                db.clone(),
                ListSource::FollowingOf(account),
                &lists_dir,
                &users_dir,
                memos.clone(),
                cancel.clone(),
                &options,
            )
            .await
        }
        .await;
        spinner.finish_and_clear();

        match result {
            Ok(mut batch) => failures.append(&mut batch),
            Err(e) => {
                print_error(&format!("Failed to mirror following of @{}: {}", name, e));
                failed_targets += 1;
            }
        }
    }

    print_failure_summary(&failures);

    if cancel.is_cancelled() {
        print_warning("Run was cancelled before all targets finished");
    }

    if failed_targets > 0 {
        return Err(Error::Api(format!("{} target(s) failed", failed_targets)));
    }
    if !failures.is_empty() {
        return Err(Error::Download(format!(
            "{} download(s) failed",
            failures.len()
        )));
    }

    Ok(())
}
