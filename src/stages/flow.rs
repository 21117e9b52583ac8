//! Generic item-flow stages: limits, windows, mapping, filtering, printing.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::io::{self, Write};

use crate::error::PipelineError;
use crate::stage::{Deferred, Transform};
use crate::stream::Stream;

fn head_body<T: 'static>(upstream: Stream<T>, size: Option<usize>) -> Stream<T> {
    match size {
        Some(n) => Stream::from_results(upstream.take(n)),
        None => Stream::from_results(upstream),
    }
}

/// Keep the first `size` items, then end. `None` keeps everything.
///
/// Never pulls upstream past the last item it yields.
pub fn head<T: 'static>(size: Option<usize>) -> Deferred<Option<usize>, T, T> {
    Transform::new("head", head_body::<T>).defer(size)
}

fn tail_body<T: 'static>(upstream: Stream<T>, size: Option<usize>) -> Stream<T> {
    let Some(n) = size else {
        return Stream::from_results(upstream);
    };
    // The last n items are only known once upstream ends.
    Stream::lazy(move || {
        let mut window = VecDeque::with_capacity(n);
        for item in upstream {
            let item = item?;
            if n == 0 {
                continue;
            }
            if window.len() == n {
                window.pop_front();
            }
            window.push_back(item);
        }
        Ok(window.into_iter().map(Ok))
    })
}

/// Keep the last `size` items. `None` keeps everything.
///
/// With a size, drains its upstream on the first pull before yielding.
pub fn tail<T: 'static>(size: Option<usize>) -> Deferred<Option<usize>, T, T> {
    Transform::new("tail", tail_body::<T>).defer(size)
}

fn map_body<T, U, F>(upstream: Stream<T>, f: F) -> Stream<U>
where
    T: 'static,
    U: 'static,
    F: FnMut(T) -> U + 'static,
{
    upstream.map_ok(f)
}

/// Map each item through `f`.
pub fn map<T, U, F>(f: F) -> Deferred<F, T, U>
where
    T: 'static,
    U: 'static,
    F: FnMut(T) -> U + 'static,
{
    Transform::new("map", map_body::<T, U, F>).defer(f)
}

fn filter_body<T, F>(upstream: Stream<T>, mut predicate: F) -> Stream<T>
where
    T: 'static,
    F: FnMut(&T) -> bool + 'static,
{
    Stream::from_results(upstream.filter(move |item| match item {
        Ok(value) => predicate(value),
        Err(_) => true,
    }))
}

/// Keep only items for which `predicate` holds.
pub fn filter<T, F>(predicate: F) -> Deferred<F, T, T>
where
    T: 'static,
    F: FnMut(&T) -> bool + 'static,
{
    Transform::new("filter", filter_body::<T, F>).defer(predicate)
}

/// Output sink for [`pretty_print_to`].
pub struct Printer(Box<dyn Write>);

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Printer")
    }
}

fn pretty_print_body<T: Debug + 'static>(upstream: Stream<T>, printer: Printer) -> Stream<T> {
    let Printer(mut out) = printer;
    upstream.try_map(move |item| {
        writeln!(out, "{item:#?}").map_err(|e| PipelineError::io("pretty_print", e))?;
        Ok(item)
    })
}

/// Pretty-print each item to stdout and pass it through unchanged.
pub fn pretty_print<T: Debug + 'static>() -> Deferred<Printer, T, T> {
    pretty_print_to(io::stdout())
}

/// Pretty-print each item to `out` and pass it through unchanged.
pub fn pretty_print_to<T, W>(out: W) -> Deferred<Printer, T, T>
where
    T: Debug + 'static,
    W: Write + 'static,
{
    Transform::new("pretty_print", pretty_print_body::<T>).defer(Printer(Box::new(out)))
}
