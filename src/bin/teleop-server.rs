// Offering side of the bridge
//
// Usage: teleop-server [client_id] [config]

use teleop_rtc::cli;
use teleop_rtc::connector::Role;

fn main() -> anyhow::Result<()> {
    cli::run_role(Role::OFFERER, "server_meta_data.yaml")
}
