//! Stage definitions and deferred application.
//!
//! A stage body is a plain function. Wrapping it in a [`Source`] or a
//! [`Transform`] fixes its shape once, at definition time:
//!
//! - a `Source` has no upstream, so calling it always opens a [`Stream`];
//! - a `Transform` can be applied to an explicit upstream right away, or
//!   deferred with only its fixed parameters, producing a [`Deferred`] value
//!   that the chain operator later binds to an upstream.
//!
//! Because the shape lives in the type, a parameter that happens to be a
//! closure, a list, or even another stream is never mistaken for the
//! missing upstream.

use std::fmt;

use crate::error::Result;
use crate::stream::Stream;

/// Declared shape of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// No upstream; produces items on its own.
    Source,
    /// Consumes an upstream stream.
    Transform,
}

impl StageKind {
    /// Can a stage of this kind start a pipeline?
    pub fn can_be_first(self) -> bool {
        self == StageKind::Source
    }

    pub fn label(self) -> &'static str {
        match self {
            StageKind::Source => "source",
            StageKind::Transform => "transform",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Catalog entry describing a stage by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageInfo {
    pub name: &'static str,
    pub kind: StageKind,
    pub usage: &'static str,
}

impl StageInfo {
    pub const fn source(name: &'static str, usage: &'static str) -> Self {
        StageInfo {
            name,
            kind: StageKind::Source,
            usage,
        }
    }

    pub const fn transform(name: &'static str, usage: &'static str) -> Self {
        StageInfo {
            name,
            kind: StageKind::Transform,
            usage,
        }
    }
}

/// A stage with no upstream parameter.
pub struct Source<P, Out> {
    name: &'static str,
    body: fn(P) -> Result<Stream<Out>>,
}

impl<P, Out: 'static> Source<P, Out> {
    pub const KIND: StageKind = StageKind::Source;

    pub const fn new(name: &'static str, body: fn(P) -> Result<Stream<Out>>) -> Self {
        Source { name, body }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the body with its parameters. Sources never defer.
    pub fn open(&self, params: P) -> Result<Stream<Out>> {
        (self.body)(params).map(|stream| stream.named(self.name))
    }
}

impl<P, Out> Clone for Source<P, Out> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P, Out> Copy for Source<P, Out> {}

impl<P, Out> fmt::Debug for Source<P, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source").field("name", &self.name).finish()
    }
}

/// A stage that consumes an upstream stream plus fixed parameters.
pub struct Transform<P, In, Out> {
    name: &'static str,
    body: fn(Stream<In>, P) -> Stream<Out>,
}

impl<P, In, Out: 'static> Transform<P, In, Out> {
    pub const KIND: StageKind = StageKind::Transform;

    pub const fn new(name: &'static str, body: fn(Stream<In>, P) -> Stream<Out>) -> Self {
        Transform { name, body }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Apply to an explicit upstream. Nothing is pulled yet.
    pub fn apply(&self, upstream: Stream<In>, params: P) -> Stream<Out> {
        (self.body)(upstream, params).named(self.name)
    }

    /// Capture the fixed parameters without an upstream.
    pub fn defer(&self, params: P) -> Deferred<P, In, Out> {
        Deferred {
            stage: *self,
            params,
        }
    }
}

impl<P, In, Out> Clone for Transform<P, In, Out> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P, In, Out> Copy for Transform<P, In, Out> {}

impl<P, In, Out> fmt::Debug for Transform<P, In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish()
    }
}

/// A transform call waiting for its upstream.
///
/// Pure data: building one performs no I/O and consumes nothing.
pub struct Deferred<P, In, Out> {
    stage: Transform<P, In, Out>,
    params: P,
}

impl<P, In, Out: 'static> Deferred<P, In, Out> {
    pub fn name(&self) -> &'static str {
        self.stage.name
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut P {
        &mut self.params
    }
}

impl<P: Clone, In, Out> Clone for Deferred<P, In, Out> {
    fn clone(&self) -> Self {
        Deferred {
            stage: self.stage,
            params: self.params.clone(),
        }
    }
}

impl<P: fmt::Debug, In, Out> fmt::Debug for Deferred<P, In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("stage", &self.stage.name)
            .field("params", &self.params)
            .finish()
    }
}

/// Anything that can take an upstream stream and produce a new one.
///
/// This is the right-hand side of the chain operator.
pub trait Bind<In> {
    type Out;

    fn bind(self, upstream: Stream<In>) -> Stream<Self::Out>;
}

impl<P, In, Out: 'static> Bind<In> for Deferred<P, In, Out> {
    type Out = Out;

    fn bind(self, upstream: Stream<In>) -> Stream<Out> {
        self.stage.apply(upstream, self.params)
    }
}

/// Two deferred pieces composed left to right, still waiting for an upstream.
#[derive(Debug, Clone)]
pub struct Chained<A, B> {
    first: A,
    second: B,
}

impl<A, B> Chained<A, B> {
    pub(crate) fn new(first: A, second: B) -> Self {
        Chained { first, second }
    }
}

/// The item type a deferred stage or fragment produces.
pub trait Yields {
    type Item;
}

impl<P, In, Out> Yields for Deferred<P, In, Out> {
    type Item = Out;
}

impl<A, B: Yields> Yields for Chained<A, B> {
    type Item = B::Item;
}

impl<In, A, B> Bind<In> for Chained<A, B>
where
    A: Bind<In>,
    B: Bind<A::Out>,
{
    type Out = B::Out;

    fn bind(self, upstream: Stream<In>) -> Stream<B::Out> {
        self.second.bind(self.first.bind(upstream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn double_body(upstream: Stream<i32>, _: ()) -> Stream<i32> {
        upstream.map_ok(|n| n * 2)
    }

    fn count_body(limit: i32) -> Result<Stream<i32>> {
        if limit < 0 {
            return Err(PipelineError::configuration("count", "negative limit"));
        }
        Ok(Stream::from_items(0..limit))
    }

    // Appends a second stream: the parameter is itself a stream.
    fn append_body(upstream: Stream<i32>, tail: Stream<i32>) -> Stream<i32> {
        Stream::from_results(upstream.chain(tail))
    }

    const DOUBLE: Transform<(), i32, i32> = Transform::new("double", double_body);
    const COUNT: Source<i32, i32> = Source::new("count", count_body);
    const APPEND: Transform<Stream<i32>, i32, i32> = Transform::new("append", append_body);

    #[test]
    fn test_source_opens_eagerly_named() {
        let s = COUNT.open(3).unwrap();
        assert_eq!(s.stage(), "count");
        assert_eq!(s.collect_items().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_source_configuration_error_at_call() {
        let err = COUNT.open(-1).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StageConfiguration);
    }

    #[test]
    fn test_transform_apply_with_explicit_upstream() {
        let s = DOUBLE.apply(Stream::from_items(vec![1, 2]), ());
        assert_eq!(s.stage(), "double");
        assert_eq!(s.collect_items().unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_defer_then_bind() {
        let deferred = DOUBLE.defer(());
        assert_eq!(deferred.name(), "double");
        let s = deferred.bind(Stream::from_items(vec![5]));
        assert_eq!(s.collect_items().unwrap(), vec![10]);
    }

    #[test]
    fn test_stream_parameter_is_not_upstream() {
        let deferred = APPEND.defer(Stream::from_items(vec![8, 9]));
        let s = deferred.bind(Stream::from_items(vec![1]));
        assert_eq!(s.collect_items().unwrap(), vec![1, 8, 9]);
    }

    #[test]
    fn test_chained_binds_left_to_right() {
        let fragment = Chained::new(DOUBLE.defer(()), APPEND.defer(Stream::from_items(vec![0])));
        let s = fragment.bind(Stream::from_items(vec![1, 2]));
        assert_eq!(s.collect_items().unwrap(), vec![2, 4, 0]);
    }

    #[test]
    fn test_kinds() {
        assert!(Source::<i32, i32>::KIND.can_be_first());
        assert!(!Transform::<(), i32, i32>::KIND.can_be_first());
        assert_eq!(StageInfo::source("cat", "cat PATH").kind, StageKind::Source);
    }

    #[test]
    fn test_deferred_clone_reuses_definition() {
        let deferred = DOUBLE.defer(());
        let again = deferred.clone();
        assert_eq!(
            deferred.bind(Stream::from_items(vec![1])).collect_items().unwrap(),
            vec![2]
        );
        assert_eq!(
            again.bind(Stream::from_items(vec![3])).collect_items().unwrap(),
            vec![6]
        );
    }
}
