use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::StatusCode;

use crate::context::Context;
use crate::error::Error;
use crate::handler::BoxFuture;

/// Turns a panic in any later handler into a `500` response.
///
/// The panic message is logged with the request fields and recorded as the
/// context error; whatever the panicking chain had written is discarded.
pub fn recover(ctx: &mut Context) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let Err(payload) = AssertUnwindSafe(ctx.next()).catch_unwind().await else {
            return;
        };
        let msg = panic_message(payload.as_ref());
        ctx.response_mut().reset();
        ctx.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        ctx.with_field("panic", &msg).fatal(Error::message(format!("handler panicked: {msg}")));
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{self, handler_func};
    use crate::request::empty;
    use crate::cancel::CancelToken;

    fn boom(_: &mut Context) -> BoxFuture<'_, ()> {
        Box::pin(async {
            panic!("boom");
        })
    }

    #[tokio::test]
    async fn panic_becomes_500() {
        let mut ctx = Context::default();
        let req = http::Request::get("/p").body(empty()).unwrap();
        ctx.reset(req, None, CancelToken::never());
        ctx.set_handler(-1, handler::chain(vec![handler_func(recover), handler_func(boom)]));
        ctx.next().await;

        assert_eq!(ctx.response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(ctx.err().is_some_and(|e| e.to_string().contains("boom")));
    }
}
