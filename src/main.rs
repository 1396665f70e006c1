#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod api;
mod cli;
mod core;
mod logging;
mod prelude;
mod quantity;
mod store;
mod tables;

use clap::{Parser, crate_version};

use crate::{cli::Args, prelude::*};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let _guard = logging::init(&args.common.saves_folder, args.common.max_files, args.common.timezone)?;
    info!(version = crate_version!(), "starting…");

    args.command.run(&args.common).await?;

    info!("done!");
    Ok(())
}
