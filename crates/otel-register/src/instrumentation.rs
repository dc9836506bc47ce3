//! Instrumentation selection.
//!
//! Rust libraries emit `tracing` spans on their own; "instrumenting" one means
//! letting its tracing targets through to the OpenTelemetry layer. Each
//! [`Instrumentation`] names a group of targets. Targets of instrumentations
//! that were not selected are switched off for export, while the
//! application's own spans pass at `info`.

use std::collections::BTreeSet;
use std::fmt;

use tracing_subscriber::filter::{EnvFilter, ParseError};

/// Level at which selected library targets are exported.
const SELECTED_LEVEL: &str = "debug";

/// Baseline directive for everything that is not a library target.
const BASE_DIRECTIVE: &str = "info";

/// A recognised instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Instrumentation {
    /// HTTP client and server transport (`hyper`, `reqwest`, `tower-http`).
    Http,
    /// Server-side request routing (`axum`).
    Express,
    /// The MongoDB driver.
    MongoDb,
}

impl Instrumentation {
    pub const ALL: [Instrumentation; 3] = [
        Instrumentation::Http,
        Instrumentation::Express,
        Instrumentation::MongoDb,
    ];

    /// The name callers use to request this instrumentation.
    pub fn name(self) -> &'static str {
        match self {
            Instrumentation::Http => "http",
            Instrumentation::Express => "express",
            Instrumentation::MongoDb => "mongodb",
        }
    }

    /// Look up an instrumentation by name, ignoring case and surrounding
    /// whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|i| i.name().eq_ignore_ascii_case(name))
    }

    /// Tracing targets whose spans this instrumentation exports.
    pub fn targets(self) -> &'static [&'static str] {
        match self {
            Instrumentation::Http => &["hyper", "hyper_util", "reqwest", "tower_http"],
            Instrumentation::Express => &["axum", "axum_core"],
            Instrumentation::MongoDb => &["mongodb"],
        }
    }
}

impl fmt::Display for Instrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of instrumentations chosen for one registration.
///
/// Holds each instrumentation at most once; iteration order is fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationSet(BTreeSet<Instrumentation>);

impl InstrumentationSet {
    /// Select instrumentations by name.
    ///
    /// Returns the selected set together with the names that were not
    /// recognised, in input order. Repeated names collapse to one entry.
    pub fn select<S: AsRef<str>>(names: &[S]) -> (Self, Vec<String>) {
        let mut selected = BTreeSet::new();
        let mut unknown = Vec::new();
        for name in names {
            match Instrumentation::from_name(name.as_ref()) {
                Some(i) => {
                    selected.insert(i);
                }
                None => unknown.push(name.as_ref().to_owned()),
            }
        }
        (Self(selected), unknown)
    }

    pub fn contains(&self, instrumentation: Instrumentation) -> bool {
        self.0.contains(&instrumentation)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Instrumentation> + '_ {
        self.0.iter().copied()
    }

    /// Comma-separated names, for log fields.
    pub fn names(&self) -> String {
        self.iter().map(Instrumentation::name).collect::<Vec<_>>().join(",")
    }

    /// Filter directives for the OpenTelemetry layer.
    ///
    /// Every known library target appears exactly once: at [`SELECTED_LEVEL`]
    /// when its instrumentation is selected, `off` otherwise.
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![BASE_DIRECTIVE.to_owned()];
        for instrumentation in Instrumentation::ALL {
            let level = if self.contains(instrumentation) {
                SELECTED_LEVEL
            } else {
                "off"
            };
            directives.extend(
                instrumentation
                    .targets()
                    .iter()
                    .map(|target| format!("{target}={level}")),
            );
        }
        directives.join(",")
    }

    /// Build the [`EnvFilter`] for the OpenTelemetry layer.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the generated directives do not parse.
    pub fn env_filter(&self) -> Result<EnvFilter, ParseError> {
        EnvFilter::try_new(self.filter_directives())
    }
}

impl FromIterator<Instrumentation> for InstrumentationSet {
    fn from_iter<T: IntoIterator<Item = Instrumentation>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
