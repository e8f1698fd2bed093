//! Orchestration of a desugaring run over a JAR archive.

use std::{
    cmp::Ordering,
    collections::BTreeSet,
    fs::File,
    io::{Read, Seek, Write},
    path::PathBuf,
};

use itertools::Itertools;
use tracing::{debug, info};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use super::{
    Analysis, DesugarError, DesugarOptions, PreScanner, UnselectedClassPolicy,
    annotation_filter::filter_annotations, generate_companion,
    invocation_site::replace_invocation_sites, type_replacement::replace_types,
};
use crate::jvm::bytecode::ClassFile;

const CLASS_FILE_SUFFIX: &str = ".class";

/// The progress of a [`JarFileClassEntrySelector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Phase {
    /// Nothing has run yet.
    Idle,
    /// Class entries have been matched against the top-level type patterns.
    Matched,
    /// Every class entry has been pre-scanned.
    Scanned,
    /// The output archive has been written.
    Sunk,
}

/// Selects class entries of a JAR archive by top-level type name and rewrites them.
///
/// A run has three phases which must be invoked in order, exactly once each:
/// [`match_top_level_java_types`](Self::match_top_level_java_types),
/// [`pre_scan`](Self::pre_scan) and [`sink_to_output`](Self::sink_to_output).
#[derive(Debug)]
pub struct JarFileClassEntrySelector {
    input: PathBuf,
    output: PathBuf,
    options: DesugarOptions,
    phase: Phase,
    selected_entry_names: BTreeSet<String>,
    analysis: Analysis,
}

impl JarFileClassEntrySelector {
    /// Creates a selector reading `input` and writing `output`.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, options: DesugarOptions) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            options,
            phase: Phase::Idle,
            selected_entry_names: BTreeSet::new(),
            analysis: Analysis::default(),
        }
    }

    /// Runs all three phases.
    /// # Errors
    /// See [`DesugarError`].
    pub fn run(mut self) -> Result<Analysis, DesugarError> {
        self.match_top_level_java_types()?
            .pre_scan()?
            .sink_to_output()?;
        Ok(self.analysis)
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The entries selected for rewriting. Empty again once the output has been written.
    #[must_use]
    pub fn selected_entry_names(&self) -> &BTreeSet<String> {
        &self.selected_entry_names
    }

    /// The replacements found by [`pre_scan`](Self::pre_scan).
    #[must_use]
    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    /// Selects the class entries matching the configured top-level type patterns.
    /// # Errors
    /// - [`DesugarError::UnmatchedPattern`] if a pattern selects nothing.
    /// - [`DesugarError::OutOfOrder`] if this is not the first phase.
    pub fn match_top_level_java_types(&mut self) -> Result<&mut Self, DesugarError> {
        self.expect_phase(Phase::Idle)?;
        let archive = ZipArchive::new(File::open(&self.input)?)?;
        let selected = match_top_level_types(
            archive.file_names().filter(|it| is_class_entry(it)),
            &self.options.top_level_type_patterns,
        )?;
        info!(
            patterns = self.options.top_level_type_patterns.len(),
            selected = selected.len(),
            "Matched top-level types"
        );
        self.selected_entry_names = selected;
        self.phase = Phase::Matched;
        Ok(self)
    }

    /// Feeds every class entry to a [`PreScanner`].
    /// # Errors
    /// - [`DesugarError::OutOfOrder`] if the entries have not been matched yet.
    /// - Any error from reading the archive or scanning a class.
    pub fn pre_scan(&mut self) -> Result<&mut Self, DesugarError> {
        self.expect_phase(Phase::Matched)?;
        let mut archive = ZipArchive::new(File::open(&self.input)?)?;
        let mut pre_scanner = PreScanner::new(self.options.supported_api_annotations.clone())
            .with_type_replacements(self.options.type_replacements.clone());
        let mut scanned = 0usize;
        for index in 0..archive.len() {
            let Some((name, bytes)) = read_entry(&mut archive, index)? else {
                continue;
            };
            if is_class_entry(&name) {
                let class_file = ClassFile::from_bytes(&bytes)?;
                pre_scanner.scan(&class_file)?;
                scanned += 1;
            }
        }
        self.analysis = pre_scanner.finish();
        info!(
            classes = scanned,
            methods = self.analysis.method_replacements().count(),
            fields = self.analysis.field_replacements().count(),
            "Pre-scanned input"
        );
        self.phase = Phase::Scanned;
        Ok(self)
    }

    /// Writes the output archive.
    ///
    /// Resources are copied unchanged. Selected classes are rewritten and accompanied by their
    /// companion class, if any. Unselected classes follow the configured
    /// [`UnselectedClassPolicy`]. Every entry is stored uncompressed with a fixed timestamp.
    /// # Errors
    /// - [`DesugarError::OutOfOrder`] if the input has not been pre-scanned yet.
    /// - Any error from generating or rewriting a class, or writing the archive.
    pub fn sink_to_output(&mut self) -> Result<&mut Self, DesugarError> {
        self.expect_phase(Phase::Scanned)?;
        let mut archive = ZipArchive::new(File::open(&self.input)?)?;
        let mut writer = ZipWriter::new(File::create(&self.output)?);
        let entry_options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(zip::DateTime::from_date_and_time(2010, 1, 1, 0, 0, 0)?)
            .unix_permissions(0o644);
        let mut written = 0usize;
        for index in 0..archive.len() {
            let Some((name, bytes)) = read_entry(&mut archive, index)? else {
                continue;
            };
            if !is_class_entry(&name) {
                write_entry(&mut writer, name, &bytes, entry_options)?;
                written += 1;
                continue;
            }
            let class_file = ClassFile::from_bytes(&bytes)?;
            let companion = generate_companion(&class_file, &self.analysis)?;
            let selected = self.selected_entry_names.contains(&name);
            if selected {
                let rewritten = self.rewrite(class_file)?;
                write_entry(&mut writer, name, &rewritten, entry_options)?;
                written += 1;
            } else {
                match self.options.unselected_classes {
                    UnselectedClassPolicy::CopyThrough => {
                        write_entry(&mut writer, name, &bytes, entry_options)?;
                        written += 1;
                    }
                    UnselectedClassPolicy::Drop => debug!(entry = %name, "Dropped unselected class"),
                }
            }
            if let Some(companion) = companion {
                let companion_name = format!("{}{CLASS_FILE_SUFFIX}", companion.this_class_name()?);
                if selected || self.matches_any_pattern(&companion_name) {
                    let rewritten = self.rewrite(companion)?;
                    write_entry(&mut writer, companion_name, &rewritten, entry_options)?;
                    written += 1;
                } else {
                    debug!(entry = %companion_name, "Skipped companion outside of selection");
                }
            }
        }
        writer.finish()?;
        info!(entries = written, output = %self.output.display(), "Wrote output archive");
        self.selected_entry_names.clear();
        self.phase = Phase::Sunk;
        Ok(self)
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), DesugarError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(DesugarError::OutOfOrder {
                expected,
                found: self.phase,
            })
        }
    }

    fn matches_any_pattern(&self, entry_name: &str) -> bool {
        self.options
            .top_level_type_patterns
            .iter()
            .any(|pattern| compare_against_pattern(entry_name, pattern).is_eq())
    }

    fn rewrite(&self, mut class_file: ClassFile) -> Result<Vec<u8>, DesugarError> {
        filter_annotations(&mut class_file, &self.options.omitted_annotations)?;
        replace_invocation_sites(
            &mut class_file,
            &self.analysis,
            self.options.retargeting_owners.as_ref(),
        )?;
        replace_types(&mut class_file, &self.analysis)?;
        Ok(class_file.to_bytes()?)
    }
}

fn is_class_entry(name: &str) -> bool {
    name.ends_with(CLASS_FILE_SUFFIX)
}

/// Reads a file entry. Returns `None` for directories.
fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
) -> Result<Option<(String, Vec<u8>)>, DesugarError> {
    let mut entry = archive.by_index(index)?;
    if entry.is_dir() {
        return Ok(None);
    }
    let name = entry.name().to_owned();
    let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or_default());
    entry.read_to_end(&mut bytes)?;
    Ok(Some((name, bytes)))
}

fn write_entry<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    name: String,
    bytes: &[u8],
    options: SimpleFileOptions,
) -> Result<(), DesugarError> {
    debug!(entry = %name, size = bytes.len(), "Writing entry");
    writer.start_file(name, options)?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Compares an entry name against a top-level type pattern, returning [`Ordering::Equal`] on a
/// match.
///
/// A pattern ending with `*` matches every entry starting with the rest of the pattern. Any
/// other pattern matches the class file of the type and of its nested types.
fn compare_against_pattern(entry_name: &str, pattern: &str) -> Ordering {
    if let Some(prefix) = pattern.strip_suffix('*') {
        return if entry_name.starts_with(prefix) {
            Ordering::Equal
        } else {
            entry_name.cmp(prefix)
        };
    }
    let class_file_name = format!("{pattern}{CLASS_FILE_SUFFIX}");
    let is_nested = entry_name
        .strip_prefix(pattern)
        .is_some_and(|rest| rest.starts_with('$'));
    if entry_name == class_file_name || is_nested {
        Ordering::Equal
    } else {
        entry_name.cmp(&class_file_name)
    }
}

/// Matches class entry names against top-level type patterns.
///
/// Both lists are sorted and walked in lockstep. A pattern that is still unmatched afterwards,
/// which happens when patterns overlap, gets a second chance against every entry.
/// # Errors
/// Returns [`DesugarError::UnmatchedPattern`] listing every pattern that matches no entry.
pub fn match_top_level_types<'a, I>(
    entry_names: I,
    patterns: &[String],
) -> Result<BTreeSet<String>, DesugarError>
where
    I: IntoIterator<Item = &'a str>,
{
    let entries = entry_names.into_iter().sorted().dedup().collect_vec();
    let patterns = patterns.iter().map(String::as_str).sorted().dedup().collect_vec();
    let mut matched = vec![false; patterns.len()];
    let mut selected = BTreeSet::new();

    let (mut entry_pos, mut pattern_pos) = (0, 0);
    while let (Some(entry), Some(pattern)) = (entries.get(entry_pos), patterns.get(pattern_pos)) {
        match compare_against_pattern(entry, pattern) {
            Ordering::Equal => {
                selected.insert((*entry).to_owned());
                matched[pattern_pos] = true;
                entry_pos += 1;
            }
            Ordering::Less => entry_pos += 1,
            Ordering::Greater => pattern_pos += 1,
        }
    }

    for (pattern, is_matched) in patterns.iter().zip(matched.iter_mut()) {
        if *is_matched {
            continue;
        }
        for entry in &entries {
            if compare_against_pattern(entry, pattern).is_eq() {
                selected.insert((*entry).to_owned());
                *is_matched = true;
            }
        }
    }

    let unmatched = patterns
        .iter()
        .zip(&matched)
        .filter(|(_, is_matched)| !**is_matched)
        .map(|(pattern, _)| (*pattern).to_owned())
        .collect_vec();
    if unmatched.is_empty() {
        Ok(selected)
    } else {
        Err(DesugarError::UnmatchedPattern(unmatched))
    }
}
