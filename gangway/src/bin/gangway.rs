// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable for gangway: the authorizing gateway in front of workspace
//! deployment backends

use camino::Utf8PathBuf;
use clap::Parser;
use gangway::Config;
use gangway::Server;
use gangway_common::cmd::fatal;
use gangway_common::cmd::CmdError;
use slog::info;

#[derive(Debug, Parser)]
#[clap(name = "gangway", about = "Authorizing gateway for deployments")]
struct Args {
    #[clap(long, action)]
    config_file: Utf8PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(cmd_error) = do_run().await {
        fatal(cmd_error);
    }
}

async fn do_run() -> Result<(), CmdError> {
    let args = Args::parse();

    let config = Config::from_file(&args.config_file)
        .map_err(|error| CmdError::Failure(error.to_string()))?;

    let log = config.log.to_logger("gangway").map_err(|msg| {
        CmdError::Failure(format!("initializing logger: {}", msg))
    })?;
    info!(log, "config"; "config" => ?config);

    let server = Server::start(config, &log)
        .await
        .map_err(|error| CmdError::Failure(format!("{:#}", error)))?;
    server
        .wait_for_finish()
        .await
        .map_err(|error| CmdError::Failure(format!("{:#}", error)))
}
