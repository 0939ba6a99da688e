//! Declarative YAML test corpus
//!
//! Each corpus file names the bucket it feeds and lists its cases in
//! execution order:
//!
//! ```yaml
//! bucket: baseline
//! cases:
//!   - id: Pos_Fun_005
//!     description: Short command to arrive
//!     inputText: issarahata enna
//!     expectedOutput: ඉස්සරහට එන්න
//!     category: Daily language usage
//!     grammarTag: Imperative (command)
//!     lengthBucket: S
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Scenario bucket a case belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Well-formed input that must transliterate exactly
    Baseline,
    /// Malformed or adversarial input
    Adversarial,
    /// Incremental typing against the live rendering
    Interactive,
}

impl Bucket {
    /// Execution order of the buckets within a session
    pub const ALL: [Bucket; 3] = [Bucket::Baseline, Bucket::Adversarial, Bucket::Interactive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Baseline => "baseline",
            Bucket::Adversarial => "adversarial",
            Bucket::Interactive => "interactive",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(Bucket::Baseline),
            "adversarial" => Ok(Bucket::Adversarial),
            "interactive" => Ok(Bucket::Interactive),
            other => Err(HarnessError::InvalidCorpus(format!("unknown bucket '{}'", other))),
        }
    }
}

/// Rough input length class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthBucket {
    S,
    M,
    L,
}

/// A single conformance case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TestCase {
    /// Stable identifier used in reports
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// Source text submitted to the page
    pub input_text: String,

    /// Exact rendering the page must produce
    pub expected_output: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub grammar_tag: String,

    pub length_bucket: LengthBucket,

    /// Prefix of `input_text` typed first in interactive cases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_input_text: Option<String>,
}

impl TestCase {
    /// The part of `input_text` that follows `partial_input_text`.
    pub fn remainder(&self) -> Option<&str> {
        let partial = self.partial_input_text.as_deref()?;
        self.input_text.strip_prefix(partial)
    }
}

/// On-disk shape of one corpus file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorpusFile {
    pub bucket: Bucket,
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

impl CorpusFile {
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        serde_yaml::from_str(yaml).map_err(HarnessError::from)
    }
}

/// Narrows a corpus down to the cases worth running
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub case_id: Option<String>,
    pub bucket: Option<Bucket>,
    pub category: Option<String>,
}

impl Selection {
    fn matches(&self, bucket: Bucket, case: &TestCase) -> bool {
        self.case_id.as_ref().map_or(true, |id| *id == case.id)
            && self.bucket.map_or(true, |b| b == bucket)
            && self.category.as_ref().map_or(true, |c| *c == case.category)
    }
}

/// The validated, read-only set of cases for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    baseline: Vec<TestCase>,
    adversarial: Vec<TestCase>,
    interactive: Vec<TestCase>,
}

impl Corpus {
    /// Build a corpus from in-memory buckets, enforcing every invariant.
    pub fn new(
        baseline: Vec<TestCase>,
        adversarial: Vec<TestCase>,
        interactive: Vec<TestCase>,
    ) -> HarnessResult<Self> {
        let corpus = Self {
            baseline,
            adversarial,
            interactive,
        };
        corpus.validate()?;
        Ok(corpus)
    }

    /// Build a corpus from YAML documents, in the given order.
    pub fn from_documents<'a, I>(documents: I) -> HarnessResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut corpus = Self::default();
        for yaml in documents {
            corpus.absorb(CorpusFile::from_yaml(yaml)?);
        }
        corpus.validate()?;
        Ok(corpus)
    }

    /// Load every `.yaml`/`.yml` file below `dir`, sorted by path.
    pub fn load_dir(dir: &Path) -> HarnessResult<Self> {
        if !dir.is_dir() {
            return Err(HarnessError::InvalidCorpus(format!(
                "corpus directory not found: {}",
                dir.display()
            )));
        }

        let mut corpus = Self::default();
        let mut files = 0usize;

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let content = std::fs::read_to_string(entry.path())?;
            let file = CorpusFile::from_yaml(&content).map_err(|e| {
                HarnessError::InvalidCorpus(format!("{}: {}", entry.path().display(), e))
            })?;
            debug!(
                "Loaded {} {} case(s) from {}",
                file.cases.len(),
                file.bucket,
                entry.path().display()
            );
            corpus.absorb(file);
            files += 1;
        }

        if files == 0 {
            return Err(HarnessError::InvalidCorpus(format!(
                "no corpus files in {}",
                dir.display()
            )));
        }

        corpus.validate()?;
        Ok(corpus)
    }

    fn absorb(&mut self, file: CorpusFile) {
        self.bucket_mut(file.bucket).extend(file.cases);
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<TestCase> {
        match bucket {
            Bucket::Baseline => &mut self.baseline,
            Bucket::Adversarial => &mut self.adversarial,
            Bucket::Interactive => &mut self.interactive,
        }
    }

    /// Cases of one bucket in execution order
    pub fn bucket(&self, bucket: Bucket) -> &[TestCase] {
        match bucket {
            Bucket::Baseline => &self.baseline,
            Bucket::Adversarial => &self.adversarial,
            Bucket::Interactive => &self.interactive,
        }
    }

    /// Every case with its bucket, in execution order
    pub fn iter(&self) -> impl Iterator<Item = (Bucket, &TestCase)> {
        Bucket::ALL
            .into_iter()
            .flat_map(move |b| self.bucket(b).iter().map(move |c| (b, c)))
    }

    pub fn len(&self) -> usize {
        self.baseline.len() + self.adversarial.len() + self.interactive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: &str) -> Option<(Bucket, &TestCase)> {
        self.iter().find(|(_, c)| c.id == id)
    }

    /// A sub-corpus keeping declared order.
    pub fn select(&self, selection: &Selection) -> Corpus {
        let mut selected = Corpus::default();
        for (bucket, case) in self.iter().filter(|(b, c)| selection.matches(*b, c)) {
            selected.bucket_mut(bucket).push(case.clone());
        }
        selected
    }

    /// SHA-256 over every case field the harness consumes.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (bucket, case) in self.iter() {
            for field in [
                bucket.as_str(),
                case.id.as_str(),
                case.input_text.as_str(),
                case.expected_output.as_str(),
                case.partial_input_text.as_deref().unwrap_or(""),
            ] {
                hasher.update(field.as_bytes());
                hasher.update([0u8]);
            }
        }
        hex::encode(hasher.finalize())
    }

    fn validate(&self) -> HarnessResult<()> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();

        for (bucket, case) in self.iter() {
            if case.id.trim().is_empty() {
                problems.push(format!("{} case with empty id", bucket));
                continue;
            }
            if !seen.insert(case.id.as_str()) {
                problems.push(format!("duplicate case id '{}'", case.id));
            }
            if case.input_text.trim().is_empty() {
                problems.push(format!("{}: inputText is blank", case.id));
            }
            if case.expected_output.trim().is_empty() {
                problems.push(format!("{}: expectedOutput is blank", case.id));
            }

            match (bucket, case.partial_input_text.as_deref()) {
                (Bucket::Interactive, None) => {
                    problems.push(format!("{}: interactive case needs partialInputText", case.id));
                }
                (Bucket::Interactive, Some(partial)) => {
                    let strict_prefix = !partial.is_empty()
                        && partial.len() < case.input_text.len()
                        && case.input_text.starts_with(partial);
                    if !strict_prefix {
                        problems.push(format!(
                            "{}: partialInputText must be a non-empty strict prefix of inputText",
                            case.id
                        ));
                    }
                }
                (_, Some(_)) => {
                    problems.push(format!(
                        "{}: partialInputText is only allowed in the interactive bucket",
                        case.id
                    ));
                }
                (_, None) => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::InvalidCorpus(problems.join("; ")))
        }
    }
}
