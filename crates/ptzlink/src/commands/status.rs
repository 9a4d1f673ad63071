//! `ptzlink status <device>`.

use ptzlink_core::PtzClient;

use crate::cli::{DeviceArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    client: &PtzClient,
    args: DeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let session = util::connect(client, &args.device, global).await?;
    let result = session.get_status().await;
    session.close().await;
    let report = result?;

    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        report.as_ref(),
        |r| output::status_detail(r, color),
        output::status_plain,
    );
    output::print_output(&out, global.quiet);

    // Still printed above: a rejection carries the device's last position.
    if let Some(reason) = report.rejection() {
        return Err(CliError::DeviceRejected {
            device_id: args.device,
            reason: reason.to_owned(),
        });
    }
    Ok(())
}
