mod common;
mod config;
mod messenger;
mod network;
mod ui;

use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use network::{HttpMessageApi, Socket, SocketConfig};
use ui::ChatApp;

use common::{Conversation, ParticipantId};

#[derive(Parser)]
#[command(
    name = "trainer_chat",
    version,
    about = "Direct messaging between a user and their trainer"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// REST base URL, e.g. http://localhost:5000/api
    #[arg(long, env = "TRAINER_CHAT_API_URL")]
    api_url: Option<String>,
    /// WebSocket endpoint of the messaging server
    #[arg(long, env = "TRAINER_CHAT_SOCKET_URL")]
    socket_url: Option<String>,
    /// Bearer token sent on REST calls and the socket upgrade
    #[arg(long, env = "TRAINER_CHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Id of the signed-in user
    #[arg(long)]
    user_id: Option<String>,
    /// Id of the trainer to chat with
    #[arg(long)]
    trainer_id: Option<String>,
    /// Write the effective settings (without the token) back to the config file
    #[arg(long)]
    save_config: bool,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("missing {0}: pass it on the command line or set it in the config file")]
    MissingId(&'static str),
    #[error(transparent)]
    Api(#[from] network::ApiError),
    #[error("ui failed: {0}")]
    Ui(#[from] eframe::Error),
}

impl Cli {
    fn apply(self, mut app_config: config::AppConfig) -> config::AppConfig {
        if let Some(url) = self.api_url {
            app_config.api_base_url = url;
        }
        if let Some(url) = self.socket_url {
            app_config.socket_url = url;
        }
        if self.token.is_some() {
            app_config.token = self.token;
        }
        if self.user_id.is_some() {
            app_config.user_id = self.user_id;
        }
        if self.trainer_id.is_some() {
            app_config.trainer_id = self.trainer_id;
        }
        app_config
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let save = cli.save_config;
    let app_config = cli.apply(config::load_config(&config_path));

    if save {
        let persisted = config::AppConfig {
            token: None,
            ..app_config.clone()
        };
        match config::save_config(&config_path, &persisted) {
            Ok(()) => log::info!("Saved settings to {config_path}"),
            Err(err) => log::warn!("Failed to save config to {config_path}: {err}"),
        }
    }

    let user_id = app_config
        .user_id
        .clone()
        .ok_or(StartupError::MissingId("user id"))?;
    let trainer_id = app_config
        .trainer_id
        .clone()
        .ok_or(StartupError::MissingId("trainer id"))?;
    let conversation = Conversation::new(ParticipantId::new(user_id), ParticipantId::new(trainer_id));

    let socket = Socket::shared(&SocketConfig {
        url: app_config.socket_url.clone(),
        token: app_config.token.clone(),
        reconnect: app_config.reconnect.clone(),
    });
    socket.connect();

    let api = Arc::new(HttpMessageApi::new(
        app_config.api_base_url.clone(),
        app_config.token.clone(),
        app_config.request_timeout(),
    )?);

    log::info!(
        "Client started for {} chatting with {}",
        conversation.local,
        conversation.remote
    );

    let runtime = tokio::runtime::Handle::current();
    let notice_ttl = app_config.notice_ttl();
    let ui_socket = socket.clone();
    let options = eframe::NativeOptions::default();
    let result = eframe::run_native(
        "Trainer Chat",
        options,
        Box::new(move |cc| {
            Ok(Box::new(ChatApp::new(
                cc,
                runtime,
                ui_socket,
                api,
                conversation,
                notice_ttl,
            )))
        }),
    );

    socket.disconnect().await;
    result?;
    Ok(())
}
