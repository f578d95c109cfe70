//! Canonical topic string construction.
//!
//! A topic is an opaque key built from a base name and zero or more
//! parameters joined with `.`: `name.param1.param2`. Parameters keep their
//! argument order and are stringified on the way in, so a numeric parameter
//! and its string form produce the same topic.

use std::fmt;

/// Parameter lists accepted by [`build_topic`] and the orchestrator's
/// `listen`/`unlisten`/`topic` operations.
///
/// Implemented for `()` (no parameters), tuples of up to eight
/// [`Display`](fmt::Display) values (mixed types allowed), and slices.
pub trait TopicParams {
    /// Stringify the parameters in call order.
    fn render(&self) -> Vec<String>;
}

impl TopicParams for () {
    fn render(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<T: fmt::Display> TopicParams for &[T] {
    fn render(&self) -> Vec<String> {
        self.iter().map(ToString::to_string).collect()
    }
}

impl<T: fmt::Display, const N: usize> TopicParams for [T; N] {
    fn render(&self) -> Vec<String> {
        self.iter().map(ToString::to_string).collect()
    }
}

macro_rules! impl_topic_params {
    ($($param:ident),+) => {
        impl<$($param: fmt::Display),+> TopicParams for ($($param,)+) {
            fn render(&self) -> Vec<String> {
                #[allow(non_snake_case)]
                let ($($param,)+) = self;
                vec![$($param.to_string()),+]
            }
        }
    };
}

impl_topic_params!(P1);
impl_topic_params!(P1, P2);
impl_topic_params!(P1, P2, P3);
impl_topic_params!(P1, P2, P3, P4);
impl_topic_params!(P1, P2, P3, P4, P5);
impl_topic_params!(P1, P2, P3, P4, P5, P6);
impl_topic_params!(P1, P2, P3, P4, P5, P6, P7);
impl_topic_params!(P1, P2, P3, P4, P5, P6, P7, P8);

/// Build the canonical topic string for `name` and `params`.
///
/// With no parameters the name is returned unchanged.
///
/// # Example
///
/// ```rust
/// use pubsub_link::build_topic;
///
/// assert_eq!(build_topic("channel-points", ()), "channel-points");
/// assert_eq!(build_topic("channel-points", (42,)), "channel-points.42");
/// assert_eq!(build_topic("chat", (42, "mods")), "chat.42.mods");
/// ```
pub fn build_topic<P: TopicParams>(name: &str, params: P) -> String {
    let params = params.render();
    if params.is_empty() {
        name.to_owned()
    } else {
        format!("{}.{}", name, params.join("."))
    }
}
