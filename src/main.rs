/*!
 * relaxnative helper
 *
 * Isolated executor spawned by the host for process-isolated calls.
 * Speaks length-prefixed JSON frames on stdin/stdout; logs go to stderr.
 */

use relaxnative::init_tracing;
use relaxnative::isolation::run_helper;
use tracing::error;

fn main() -> anyhow::Result<()> {
    init_tracing();

    if let Err(e) = run_helper() {
        error!(error = %e, "helper terminated with an error");
        return Err(e);
    }
    Ok(())
}
