//! The single-pass, pull-based stream every stage consumes and produces.
//!
//! A [`Stream`] is an iterator of `Result<T>` that tracks its own lifecycle:
//!
//! ```text
//! NotStarted --first pull--> Active --end of input--> Done
//!                              |
//!                              +--error--> Failed
//! ```
//!
//! `Done` keeps answering `None`. `Failed` answers every later pull with
//! [`PipelineError::StageFailed`]. Entering either terminal state drops the
//! producer (closing any file, socket or child process it owns) and runs the
//! registered teardown hooks before the caller sees the result. Dropping a
//! stream early does the same.

use std::fmt;
use std::mem;

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

type Producer<T> = Box<dyn Iterator<Item = Result<T>>>;
type Opener<T> = Box<dyn FnOnce() -> Result<Producer<T>>>;
type Hook = Box<dyn FnOnce()>;

/// Lifecycle of one stage instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    NotStarted,
    Active,
    Done,
    Failed,
}

impl StageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StageState::Done | StageState::Failed)
    }
}

enum Inner<T> {
    Pending(Opener<T>),
    Running(Producer<T>),
    Closed,
}

/// A lazy, single-reader sequence of items.
pub struct Stream<T> {
    stage: &'static str,
    state: StageState,
    inner: Inner<T>,
    hooks: Vec<Hook>,
}

impl<T: 'static> Stream<T> {
    /// Wrap a fallible iterator.
    pub fn from_results<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Result<T>>,
        I::IntoIter: 'static,
    {
        Self::with_inner(Inner::Running(Box::new(iter.into_iter())))
    }

    /// Adapt an in-memory sequence (or any infallible iterator).
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Self::from_results(items.into_iter().map(Ok))
    }

    /// A stream that ends on its first pull.
    pub fn empty() -> Self {
        Self::from_results(std::iter::empty())
    }

    /// Defer building the producer until the first pull.
    ///
    /// An error from `open` fails the stream at that pull.
    pub fn lazy<F, I>(open: F) -> Self
    where
        F: FnOnce() -> Result<I> + 'static,
        I: Iterator<Item = Result<T>> + 'static,
    {
        Self::with_inner(Inner::Pending(Box::new(move || {
            open().map(|iter| Box::new(iter) as Producer<T>)
        })))
    }

    fn with_inner(inner: Inner<T>) -> Self {
        Stream {
            stage: "stream",
            state: StageState::NotStarted,
            inner,
            hooks: Vec::new(),
        }
    }

    /// Label the stream with the stage that produces it.
    pub fn named(mut self, stage: &'static str) -> Self {
        self.stage = stage;
        self
    }

    /// Register a hook that runs once when the stream is torn down,
    /// whether it finished, failed or was abandoned.
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Transform successful items, passing errors through.
    pub fn map_ok<U, F>(self, mut f: F) -> Stream<U>
    where
        U: 'static,
        F: FnMut(T) -> U + 'static,
    {
        let stage = self.stage;
        Stream::from_results(self.map(move |item| item.map(&mut f))).named(stage)
    }

    /// Transform successful items with a fallible function.
    pub fn try_map<U, F>(self, mut f: F) -> Stream<U>
    where
        U: 'static,
        F: FnMut(T) -> Result<U> + 'static,
    {
        let stage = self.stage;
        Stream::from_results(self.map(move |item| item.and_then(&mut f))).named(stage)
    }

    /// Drain the stream, stopping at the first error.
    pub fn collect_items(self) -> Result<Vec<T>> {
        self.collect()
    }
}

impl<T> Stream<T> {
    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    fn start(&mut self) -> Result<()> {
        self.inner = match mem::replace(&mut self.inner, Inner::Closed) {
            Inner::Pending(open) => Inner::Running(open()?),
            running => running,
        };
        Ok(())
    }

    fn teardown(&mut self, state: StageState) {
        self.state = state;
        self.inner = Inner::Closed;
        for hook in self.hooks.drain(..) {
            hook();
        }
        debug!(stage = self.stage, ?state, "stage closed");
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        warn!(stage = self.stage, kind = %err.kind(), error = %err, "stage failed");
        self.teardown(StageState::Failed);
        err
    }
}

impl<T> Iterator for Stream<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            StageState::Done => return None,
            StageState::Failed => {
                return Some(Err(PipelineError::StageFailed {
                    stage: self.stage.to_string(),
                }));
            }
            StageState::NotStarted => {
                debug!(stage = self.stage, "stage started");
                self.state = StageState::Active;
                if let Err(err) = self.start() {
                    return Some(Err(self.fail(err)));
                }
            }
            StageState::Active => {}
        }

        let next = match &mut self.inner {
            Inner::Running(producer) => producer.next(),
            _ => None,
        };
        match next {
            Some(Ok(item)) => Some(Ok(item)),
            Some(Err(err)) => Some(Err(self.fail(err))),
            None => {
                self.teardown(StageState::Done);
                None
            }
        }
    }
}

impl<T> Drop for Stream<T> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            debug!(stage = self.stage, state = ?self.state, "stage abandoned");
            self.inner = Inner::Closed;
            for hook in self.hooks.drain(..) {
                hook();
            }
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("stage", &self.stage)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_from_items_yields_in_order() {
        let items = Stream::from_items(vec![1, 2, 3]).collect_items().unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[test]
    fn test_eager_producer_kept_across_pulls() {
        let mut s = Stream::from_results(vec![Ok(1), Ok(2)]);
        assert_eq!(s.next().unwrap().unwrap(), 1);
        assert_eq!(s.state(), StageState::Active);
        assert_eq!(s.next().unwrap().unwrap(), 2);
        assert!(s.next().is_none());
        assert_eq!(s.state(), StageState::Done);
    }

    #[test]
    fn test_state_transitions_to_done() {
        let mut s = Stream::from_items(vec!["a"]);
        assert_eq!(s.state(), StageState::NotStarted);
        assert_eq!(s.next().unwrap().unwrap(), "a");
        assert_eq!(s.state(), StageState::Active);
        assert!(s.next().is_none());
        assert_eq!(s.state(), StageState::Done);
        // Done is terminal and quiet.
        assert!(s.next().is_none());
        assert!(s.next().is_none());
    }

    #[test]
    fn test_failed_stays_failed() {
        let items = vec![
            Ok(1),
            Err(PipelineError::runtime("test", "boom")),
            Ok(3),
        ];
        let mut s = Stream::from_results(items).named("test");
        assert_eq!(s.next().unwrap().unwrap(), 1);
        let err = s.next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "test: boom");
        assert_eq!(s.state(), StageState::Failed);
        // The item after the error is never resurrected.
        assert!(matches!(
            s.next(),
            Some(Err(PipelineError::StageFailed { .. }))
        ));
        assert!(matches!(
            s.next(),
            Some(Err(PipelineError::StageFailed { .. }))
        ));
    }

    #[test]
    fn test_lazy_does_not_open_until_pulled() {
        let opened = Rc::new(Cell::new(false));
        let flag = opened.clone();
        let mut s = Stream::lazy(move || {
            flag.set(true);
            Ok(vec![Ok(7)].into_iter())
        });
        assert!(!opened.get());
        assert_eq!(s.next().unwrap().unwrap(), 7);
        assert!(opened.get());
    }

    #[test]
    fn test_lazy_open_error_fails_stream() {
        let mut s: Stream<i32> = Stream::lazy(|| {
            Err::<std::iter::Empty<Result<i32>>, _>(PipelineError::runtime("x", "no"))
        });
        assert!(s.next().unwrap().is_err());
        assert_eq!(s.state(), StageState::Failed);
    }

    #[test]
    fn test_hook_runs_on_done() {
        let closed = Rc::new(Cell::new(0));
        let counter = closed.clone();
        let s = Stream::from_items(vec![1, 2]).on_close(move || counter.set(counter.get() + 1));
        assert_eq!(s.collect_items().unwrap(), vec![1, 2]);
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn test_hook_runs_before_error_is_seen() {
        let closed = Rc::new(Cell::new(false));
        let flag = closed.clone();
        let mut s = Stream::from_results(vec![Err::<i32, _>(PipelineError::runtime("x", "bad"))])
            .on_close(move || flag.set(true));
        assert!(s.next().unwrap().is_err());
        assert!(closed.get());
    }

    #[test]
    fn test_hook_runs_when_abandoned() {
        let closed = Rc::new(Cell::new(0));
        let counter = closed.clone();
        let mut s =
            Stream::from_items(0..).on_close(move || counter.set(counter.get() + 1));
        assert_eq!(s.next().unwrap().unwrap(), 0);
        assert_eq!(closed.get(), 0);
        drop(s);
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn test_hook_runs_once_for_unstarted_drop() {
        let closed = Rc::new(Cell::new(0));
        let counter = closed.clone();
        let s = Stream::from_items(vec![1]).on_close(move || counter.set(counter.get() + 1));
        drop(s);
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn test_map_ok_and_try_map() {
        let doubled = Stream::from_items(vec![1, 2, 3])
            .map_ok(|n| n * 2)
            .collect_items()
            .unwrap();
        assert_eq!(doubled, vec![2, 4, 6]);

        let err = Stream::from_items(vec![1, 2, 3])
            .try_map(|n| {
                if n == 2 {
                    Err(PipelineError::runtime("check", "two"))
                } else {
                    Ok(n)
                }
            })
            .collect_items()
            .unwrap_err();
        assert_eq!(err.to_string(), "check: two");
    }

    #[test]
    fn test_empty() {
        let mut s: Stream<u8> = Stream::empty();
        assert!(s.next().is_none());
        assert_eq!(s.state(), StageState::Done);
    }
}
