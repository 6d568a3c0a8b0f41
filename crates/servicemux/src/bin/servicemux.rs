//! Servicemux CLI
//!
//! Usage:
//!   servicemux --file services.json
//!   servicemux --file services.json --stop-on-error
//!   servicemux --file services.yaml --dry-run

use servicemux::{ConsoleSink, LaunchPlan, MuxArgs, ServicesFile, Supervisor, SupervisorConfig};

#[tokio::main]
async fn main() {
    let args: MuxArgs = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(args.log_filter());
    env_logger::init_from_env(env);

    let Some(file) = args.file.as_deref() else {
        log::error!("No services file provided (use --file)");
        std::process::exit(1);
    };

    // Load services file
    log::info!("Loading services file: {}", file);
    let services_file = match ServicesFile::from_file(file) {
        Ok(sf) => sf,
        Err(e) => {
            log::error!("Failed to load services file: {}", e);
            std::process::exit(1);
        }
    };

    // Validate only mode
    if args.validate {
        println!("Services file '{}' is valid", file);
        println!("  Root: {}", services_file.root_path.display());
        println!("  Services: {}", services_file.services.len());
        return;
    }

    // Dry run mode
    if args.dry_run {
        let plan = LaunchPlan::new(&services_file.root_path, &services_file.services);
        println!("{}", plan);
        return;
    }

    let config = SupervisorConfig {
        root_path: services_file.root_path.clone(),
        stop_on_error: args.stop_on_error,
        grace_period: args.grace_period(),
    };
    let supervisor = Supervisor::new(config);

    // Set up Ctrl+C handler
    {
        let cancel = supervisor.cancellation_token();
        if let Err(e) = ctrlc::set_handler(move || {
            log::info!("Received Ctrl+C, initiating shutdown...");
            cancel.cancel();
        }) {
            log::error!("Error setting Ctrl+C handler: {}", e);
            std::process::exit(1);
        }
    }

    match supervisor
        .run(&services_file.services, &mut ConsoleSink)
        .await
    {
        Ok(summary) => {
            let failed = summary.exits.iter().filter(|e| !e.success()).count();
            log::info!(
                "Servicemux exiting ({} output lines, {} error lines, {} services failed)",
                summary.output_lines,
                summary.error_lines,
                failed
            );
        }
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
