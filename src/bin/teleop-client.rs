// Answering side of the bridge
//
// Usage: teleop-client [client_id] [config]

use teleop_rtc::cli;
use teleop_rtc::connector::Role;

fn main() -> anyhow::Result<()> {
    cli::run_role(Role::ANSWERER, "client_meta_data.yaml")
}
