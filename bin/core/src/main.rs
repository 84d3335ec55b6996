use std::net::SocketAddr;

use anyhow::Context;

#[macro_use]
extern crate tracing;

mod api;
mod config;
mod mutex;
mod process;
mod scan;
mod schedule;
mod startup;
mod state;
mod upstream;

async fn app() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = config::core_config();
  logger::init(&config.logging)?;

  info!(
    "{} Core version: v{}",
    config.title,
    env!("CARGO_PKG_VERSION")
  );

  state::init_db_client().await;
  state::upstream();
  startup::on_startup().await;

  let socket_addr =
    format!("{}:{}", config.bind_ip, config.port)
      .parse::<SocketAddr>()
      .context("failed to parse bind ip / port into socket addr")?;

  info!("HubMirror Core listening on {socket_addr}");

  let listener = tokio::net::TcpListener::bind(&socket_addr)
    .await
    .context("failed to bind tcp listener")?;

  axum::serve(listener, api::app())
    .await
    .context("server crashed")?;

  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let mirror_version = concat!("v", env!("CARGO_PKG_VERSION"));
  println!("HubMirror Core {mirror_version}");
  app().await
}
