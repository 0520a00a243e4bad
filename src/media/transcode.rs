use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::TRANSCODED_FILE_NAME;
use crate::CasterError;

/// Ordered encoder options, rendered as `name=value,name=value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TranscodingParameters {
    entries: Vec<(String, String)>,
}

impl Default for TranscodingParameters {
    fn default() -> Self {
        Self::from_pairs([
            ("vcodec", "VP80"),
            ("vb", "1000"),
            ("vfilter", "canvas{width=640,height=360}"),
            ("acodec", "vorb"),
            ("ab", "128"),
            ("channels", "2"),
            ("samplerate", "44100"),
            ("threads", "2"),
        ])
    }
}

impl TranscodingParameters {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Replace `name` in place, or append it if absent.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for TranscodingParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

impl FromStr for TranscodingParameters {
    type Err = CasterError;

    /// Parses `name=value` pairs split on top-level commas; commas inside
    /// `{...}` stay part of the value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;

        let mut push = |chunk: &str| -> Result<(), CasterError> {
            let chunk = chunk.trim();
            if chunk.is_empty() {
                return Ok(());
            }
            let (name, value) = chunk.split_once('=').ok_or_else(|| {
                CasterError::Config(format!("transcoding option '{}' has no value", chunk))
            })?;
            if name.trim().is_empty() {
                return Err(CasterError::Config(format!("transcoding option '{}' has no name", chunk)));
            }
            entries.push((name.trim().to_string(), value.trim().to_string()));
            Ok(())
        };

        for (i, c) in s.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        CasterError::Config(format!("unbalanced '}}' in transcoding options at {}", i))
                    })?
                }
                ',' if depth == 0 => {
                    push(&s[start..i])?;
                    start = i + 1;
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(CasterError::Config("unbalanced '{' in transcoding options".into()));
        }
        push(&s[start..])?;

        Ok(Self { entries })
    }
}

impl From<TranscodingParameters> for String {
    fn from(params: TranscodingParameters) -> Self {
        params.to_string()
    }
}

impl TryFrom<String> for TranscodingParameters {
    type Error = CasterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Encoder options plus the HTTP sink the transcoder serves from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    pub parameters: TranscodingParameters,
    pub port: u16,
    /// Keep the sink up after the last client disconnects
    pub keep_alive: bool,
}

impl SinkSpec {
    pub fn new(parameters: TranscodingParameters, port: u16) -> Self {
        Self {
            parameters,
            port,
            keep_alive: true,
        }
    }

    pub fn destination(&self) -> String {
        format!(":{}/{}", self.port, TRANSCODED_FILE_NAME)
    }

    /// `mux=webm,dst=:<port>/cast.webm`
    pub fn sink_clause(&self) -> String {
        format!("mux=webm,dst={}", self.destination())
    }

    /// Full stream output chain, e.g. `#transcode{...}:http{mux=webm,dst=:8081/cast.webm}`.
    pub fn stream_output(&self) -> String {
        format!("#transcode{{{}}}:http{{{}}}", self.parameters, self.sink_clause())
    }
}
