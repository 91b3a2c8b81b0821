use clap::Parser;
use tokengate::cli::{
    Args, build_config, handle_create_admin, init_logging, load_jwt_secret, open_database,
    take_admin_password,
};
use tokengate::{init_cleanup, run_server, session_issuer};
use tracing::error;

fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    // Secrets are scrubbed from the environment while the process is still single-threaded
    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };
    let admin_password = match args.create_admin {
        Some(_) => match take_admin_password() {
            Some(password) => Some(password),
            None => std::process::exit(1),
        },
        None => None,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        });

    runtime.block_on(serve(args, jwt_secret, admin_password));
}

async fn serve(args: Args, jwt_secret: Vec<u8>, admin_password: Option<String>) {
    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let config = build_config(&args, db, jwt_secret);

    if let (Some(member_id), Some(password)) = (args.create_admin.as_deref(), admin_password) {
        let sessions = session_issuer(&config).unwrap_or_else(|e| {
            error!(error = %e, "Invalid signing key");
            std::process::exit(1);
        });
        handle_create_admin(&config.db, &sessions, member_id, &password).await;
    }

    init_cleanup(&config.db).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
