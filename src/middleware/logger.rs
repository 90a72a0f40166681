use tokio::time::Instant;

use crate::context::Context;
use crate::handler::BoxFuture;

/// Writes one access-log line per request once the chain has finished.
///
/// Failed requests (those with [`Context::err`] set) and `5xx` answers are
/// logged at error level, everything else at info.
pub fn logger(ctx: &mut Context) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let start = Instant::now();
        ctx.next().await;

        let status = ctx.response().status();
        let size = ctx.response().size();
        let remote = ctx.real_ip();
        let failed = ctx.err().is_some() || status.is_server_error();
        let entry = ctx.with_fields([
            ("remote", remote),
            ("status", status.as_u16().to_string()),
            ("latency", format!("{:?}", start.elapsed())),
            ("size", size.to_string()),
        ]);
        if failed {
            entry.error("request failed");
        } else {
            entry.info("request served");
        }
    })
}
