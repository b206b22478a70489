// SPDX-License-Identifier: BSD-3-Clause
//! Prints how long each span was entered for, once it closes.

use std::time::{Duration, Instant};

use tracing::{Id, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

#[derive(Debug, Default)]
pub struct SpanTimeLayer;

/// Time of the current entry, and time spent in earlier ones
struct Busy {
    entered: Option<Instant>,
    total: Duration,
}

impl<S> Layer<S> for SpanTimeLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut ext = span.extensions_mut();
            match ext.get_mut::<Busy>() {
                Some(busy) => busy.entered = Some(Instant::now()),
                None => ext.insert(Busy {
                    entered: Some(Instant::now()),
                    total: Duration::ZERO,
                }),
            }
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(busy) = span.extensions_mut().get_mut::<Busy>() {
                if let Some(start) = busy.entered.take() {
                    busy.total += start.elapsed();
                }
            }
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(&id) {
            if let Some(busy) = span.extensions().get::<Busy>() {
                eprintln!("{}: {}", span.name(), busy.total.as_nanos())
            }
        }
    }
}
