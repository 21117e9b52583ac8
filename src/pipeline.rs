//! The chain operator.
//!
//! `left | right` binds the stream on the left into the deferred stage on
//! the right and returns the resulting stream. Rust's `|` is left
//! associative, so `a | b | c` is `(a | b) | c` and every stage receives a
//! fully resolved stream. Composition only wires iterators together; no item
//! moves until the final stream is pulled.
//!
//! Deferred stages can also be composed with each other into a reusable
//! fragment that is bound later:
//!
//! ```
//! use shell_pipes::prelude::*;
//!
//! let clean = grep("^ca").unwrap() | sed("^ca", "fu").unwrap();
//! let out = Stream::from_items(vec!["cat", "dog", "cab"]) | clean;
//! assert_eq!(out.collect_items().unwrap(), vec!["fut", "fub"]);
//! ```
//!
//! Only deferred stages (or fragments of them) are accepted on the right,
//! and their input must match what the left side yields. Neither
//! `stream | stream` nor a mismatched fragment type-checks:
//!
//! ```compile_fail
//! use shell_pipes::prelude::*;
//!
//! let fragment = grep::<String>("a").unwrap() | head(Some(1));
//! let _ = fragment | 5;
//! ```

use std::ops::BitOr;

use crate::stage::{Bind, Chained, Deferred, Yields};
use crate::stream::Stream;

impl<In, R> BitOr<R> for Stream<In>
where
    R: Bind<In>,
{
    type Output = Stream<R::Out>;

    fn bitor(self, right: R) -> Stream<R::Out> {
        right.bind(self)
    }
}

impl<P, In, Out, R> BitOr<R> for Deferred<P, In, Out>
where
    Out: 'static,
    R: Bind<Out>,
{
    type Output = Chained<Self, R>;

    fn bitor(self, right: R) -> Self::Output {
        Chained::new(self, right)
    }
}

impl<A, B, R> BitOr<R> for Chained<A, B>
where
    B: Yields,
    R: Bind<B::Item>,
{
    type Output = Chained<Self, R>;

    fn bitor(self, right: R) -> Self::Output {
        Chained::new(self, right)
    }
}

impl<In> Stream<In> {
    /// Method form of `self | right`.
    pub fn pipe<R>(self, right: R) -> Stream<R::Out>
    where
        R: Bind<In>,
    {
        right.bind(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{filter, grep, head, map, sed, tail};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_chain_is_lazy() {
        let pulled = Rc::new(Cell::new(0));
        let seen = pulled.clone();
        let source = Stream::from_items((0..100).inspect(move |_| seen.set(seen.get() + 1)));

        let mut out = source | map(|n: i32| n + 1) | filter(|n: &i32| n % 2 == 0) | head(Some(3));
        assert_eq!(pulled.get(), 0);

        assert_eq!(out.next().unwrap().unwrap(), 2);
        assert_eq!(pulled.get(), 2);
    }

    #[test]
    fn test_pull_stops_at_head_limit() {
        let pulled = Rc::new(Cell::new(0));
        let seen = pulled.clone();
        let source = Stream::from_items((0..).inspect(move |_| seen.set(seen.get() + 1)));
        let out = (source | head(Some(5))).collect_items().unwrap();
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
        assert_eq!(pulled.get(), 5);
    }

    #[test]
    fn test_left_associative() {
        let left = (Stream::from_items(1..=6) | map(|n: i32| n * 10)) | tail(Some(2));
        assert_eq!(left.collect_items().unwrap(), vec![50, 60]);
    }

    #[test]
    fn test_pipe_method_matches_operator() {
        let a = (Stream::from_items(vec!["cat", "dog"]) | grep("^c").unwrap())
            .collect_items()
            .unwrap();
        let b = Stream::from_items(vec!["cat", "dog"])
            .pipe(grep("^c").unwrap())
            .collect_items()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fragment_reuse() {
        let fragment = grep("a").unwrap() | sed("a", "A").unwrap() | head(Some(1));
        let first = (Stream::from_items(vec!["xa", "ya"]) | fragment.clone())
            .collect_items()
            .unwrap();
        let second = (Stream::from_items(vec!["b", "ba"]) | fragment)
            .collect_items()
            .unwrap();
        assert_eq!(first, vec!["xA"]);
        assert_eq!(second, vec!["bA"]);
    }

    #[test]
    fn test_fragment_extends_with_matching_item_type() {
        let fragment = map(|n: i32| n.to_string()) | grep("1").unwrap() | head(Some(2));
        let out = (Stream::from_items(5..20) | fragment).collect_items().unwrap();
        assert_eq!(out, vec!["10", "11"]);
    }

    #[test]
    fn test_identity_map_is_noop() {
        let input = vec!["x", "y", "z"];
        let out = (Stream::from_items(input.clone()) | map(|s: &'static str| s))
            .collect_items()
            .unwrap();
        assert_eq!(out, input);
    }
}
