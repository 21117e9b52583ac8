//! Text stages: matching, substitution, field splitting, line endings.
//!
//! Items only need to be `AsRef<str>`, so these work on `String`, `&str`
//! and anything else that derefs to text.

use regex::Regex;

use crate::error::{PipelineError, Result};
use crate::stage::{Deferred, Transform};
use crate::stream::Stream;

fn compile(stage: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| PipelineError::InvalidPattern {
        stage: stage.to_string(),
        source,
    })
}

/// Split a line into its text and its trailing `\n` or `\r\n`, so `$`
/// anchors at the end of the text.
fn split_ending(line: &str) -> (&str, &str) {
    let body = line.trim_end_matches(['\r', '\n']);
    line.split_at(body.len())
}

fn grep_body<T: AsRef<str> + 'static>(upstream: Stream<T>, pattern: Regex) -> Stream<T> {
    Stream::from_results(upstream.filter(move |item| match item {
        Ok(line) => pattern.is_match(split_ending(line.as_ref()).0),
        Err(_) => true,
    }))
}

/// Keep items where the regex `pattern` matches anywhere.
pub fn grep<T: AsRef<str> + 'static>(pattern: &str) -> Result<Deferred<Regex, T, T>> {
    let regex = compile("grep", pattern)?;
    Ok(Transform::new("grep", grep_body::<T>).defer(regex))
}

fn grep_in_body<T: AsRef<str> + 'static>(upstream: Stream<T>, needles: Vec<String>) -> Stream<T> {
    Stream::from_results(upstream.filter(move |item| match item {
        Ok(line) => needles.iter().any(|n| line.as_ref().contains(n.as_str())),
        Err(_) => true,
    }))
}

/// Keep items containing any of the given substrings.
///
/// An empty list keeps nothing.
pub fn grep_in<T, I, S>(needles: I) -> Deferred<Vec<String>, T, T>
where
    T: AsRef<str> + 'static,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let needles = needles.into_iter().map(Into::into).collect();
    Transform::new("grep_in", grep_in_body::<T>).defer(needles)
}

/// Parameters of [`sed`].
#[derive(Debug, Clone)]
pub struct SedParams {
    regex: Regex,
    replacement: String,
    exclusive: bool,
}

impl SedParams {
    /// Replace the first match in `line`.
    ///
    /// Non-matching lines are kept as-is, or dropped in exclusive mode.
    fn substitute(&self, line: &str) -> Option<String> {
        let (body, ending) = split_ending(line);
        if let Some(caps) = self.regex.captures(body)
            && let Some(whole) = caps.get(0)
        {
            let mut out = String::with_capacity(line.len() + self.replacement.len());
            out.push_str(&body[..whole.start()]);
            caps.expand(&self.replacement, &mut out);
            out.push_str(&body[whole.end()..]);
            out.push_str(ending);
            return Some(out);
        }
        (!self.exclusive).then(|| line.to_string())
    }
}

fn sed_body<T: AsRef<str> + 'static>(upstream: Stream<T>, params: SedParams) -> Stream<String> {
    Stream::from_results(upstream.filter_map(move |item| match item {
        Ok(line) => params.substitute(line.as_ref()).map(Ok),
        Err(e) => Some(Err(e)),
    }))
}

/// Replace the first match of `pattern` in each item with `replacement`.
///
/// The replacement may refer to capture groups as `$1` or `${name}`.
pub fn sed<T: AsRef<str> + 'static>(
    pattern: &str,
    replacement: &str,
) -> Result<Deferred<SedParams, T, String>> {
    let regex = compile("sed", pattern)?;
    Ok(Transform::new("sed", sed_body::<T>).defer(SedParams {
        regex,
        replacement: replacement.to_string(),
        exclusive: false,
    }))
}

impl<T: 'static> Deferred<SedParams, T, String> {
    /// Drop items that do not match instead of passing them through.
    pub fn exclusive(mut self) -> Self {
        self.params_mut().exclusive = true;
        self
    }
}

/// Which fields [`cut`] keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fields {
    All,
    /// Fields by index, in the order given.
    Pick(Vec<usize>),
}

/// Parameters of [`cut`] and [`cut_field`].
#[derive(Debug, Clone)]
pub struct CutParams {
    fields: Fields,
    delimiter: Option<String>,
}

impl CutParams {
    fn new(fields: Fields, delimiter: Option<&str>) -> Result<Self> {
        if delimiter == Some("") {
            return Err(PipelineError::configuration("cut", "empty delimiter"));
        }
        Ok(CutParams {
            fields,
            delimiter: delimiter.map(str::to_string),
        })
    }

    fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match &self.delimiter {
            None => line.split_whitespace().collect(),
            Some(delim) => line.split(delim.as_str()).collect(),
        }
    }

    fn pick(&self, line: &str) -> Result<Vec<String>> {
        let parts = self.split(line);
        match &self.fields {
            Fields::All => Ok(parts.into_iter().map(str::to_string).collect()),
            Fields::Pick(indices) => indices
                .iter()
                .map(|&i| {
                    parts.get(i).map(|p| p.to_string()).ok_or_else(|| {
                        PipelineError::runtime(
                            "cut",
                            format!("no field {i} in {line:?} ({} fields)", parts.len()),
                        )
                    })
                })
                .collect(),
        }
    }
}

fn cut_body<T: AsRef<str> + 'static>(
    upstream: Stream<T>,
    params: CutParams,
) -> Stream<Vec<String>> {
    upstream.try_map(move |line| params.pick(line.as_ref()))
}

/// Split each item and keep the selected fields as a list.
///
/// With no delimiter, splits on runs of whitespace.
pub fn cut<T: AsRef<str> + 'static>(
    fields: Fields,
    delimiter: Option<&str>,
) -> Result<Deferred<CutParams, T, Vec<String>>> {
    let params = CutParams::new(fields, delimiter)?;
    Ok(Transform::new("cut", cut_body::<T>).defer(params))
}

fn cut_field_body<T: AsRef<str> + 'static>(
    upstream: Stream<T>,
    params: CutParams,
) -> Stream<String> {
    upstream.try_map(move |line| {
        let mut picked = params.pick(line.as_ref())?;
        Ok(picked.pop().unwrap_or_default())
    })
}

/// Split each item and keep the single field at `index`.
pub fn cut_field<T: AsRef<str> + 'static>(
    index: usize,
    delimiter: Option<&str>,
) -> Result<Deferred<CutParams, T, String>> {
    let params = CutParams::new(Fields::Pick(vec![index]), delimiter)?;
    Ok(Transform::new("cut", cut_field_body::<T>).defer(params))
}

fn join_body<S: AsRef<str> + 'static>(
    upstream: Stream<Vec<S>>,
    delimiter: String,
) -> Stream<String> {
    upstream.map_ok(move |fields| {
        let parts: Vec<&str> = fields.iter().map(|field| field.as_ref()).collect();
        parts.join(delimiter.as_str())
    })
}

/// Join each list item with `delimiter`.
pub fn join<S: AsRef<str> + 'static>(delimiter: &str) -> Deferred<String, Vec<S>, String> {
    Transform::new("join", join_body::<S>).defer(delimiter.to_string())
}

fn dos2unix_body<T: AsRef<str> + 'static>(upstream: Stream<T>, _: ()) -> Stream<String> {
    upstream.map_ok(|line| line.as_ref().replace("\r\n", "\n"))
}

/// Turn `\r\n` line endings into `\n`.
pub fn dos2unix<T: AsRef<str> + 'static>() -> Deferred<(), T, String> {
    Transform::new("dos2unix", dos2unix_body::<T>).defer(())
}

fn to_dos(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 1);
    let mut after_cr = false;
    for ch in line.chars() {
        if ch == '\n' && !after_cr {
            out.push('\r');
        }
        out.push(ch);
        after_cr = ch == '\r';
    }
    out
}

fn unix2dos_body<T: AsRef<str> + 'static>(upstream: Stream<T>, _: ()) -> Stream<String> {
    upstream.map_ok(|line| to_dos(line.as_ref()))
}

/// Turn bare `\n` line endings into `\r\n`. Existing `\r\n` is left alone.
pub fn unix2dos<T: AsRef<str> + 'static>() -> Deferred<(), T, String> {
    Transform::new("unix2dos", unix2dos_body::<T>).defer(())
}
