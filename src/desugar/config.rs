//! Built-in configurations and the options of a desugaring run.

use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
};

use derive_more::Display;

use super::DesugarError;

/// Marks a member that is part of the supported API surface.
pub const API_GENERATING_ANNOTATION: &str =
    "com/google/devtools/build/android/annotations/DesugarSupportedApi";

/// Marks a member that supported APIs depend on.
pub const INTO_DESUGAR_EXTENDED_CLASS_ANNOTATION: &str =
    "com/google/devtools/build/android/annotations/DesugarSupportedApiHelper";

/// Annotations removed from every written class, in descriptor form.
pub const OMITTED_ANNOTATIONS: [&str; 9] = [
    "Lcom/google/devtools/build/android/annotations/DesugarSupportedApi;",
    "Lcom/google/devtools/build/android/annotations/DesugarSupportedApiHelper;",
    "Ljdk/internal/HotSpotIntrinsicCandidate;",
    "Ljdk/internal/vm/annotation/Contended;",
    "Ljdk/internal/vm/annotation/DontInline;",
    "Ljdk/internal/vm/annotation/ForceInline;",
    "Ljdk/internal/vm/annotation/Preserve;",
    "Ljdk/internal/vm/annotation/ReservedStackAccess;",
    "Ljdk/internal/vm/annotation/Stable;",
];

const D8_ANDROID_JDK11_LIB_TOP_LEVEL_TYPE_PATTERNS: &[&str] = &[
    "java/io/BufferedInputStream",
    "java/io/Desugar*",
    "java/io/UncheckedIOException",
    "java/lang/AbstractStringBuilder",
    "java/lang/CharSequence",
    "java/lang/DesugarCharacter",
    "java/lang/FunctionalInterface",
    "java/lang/Iterable",
    "java/lang/ReflectiveOperationException",
    "java/lang/String",
    "java/lang/annotation/Native",
    "java/lang/annotation/Repeatable",
    "java/net/URLDecoder",
    "java/net/URLEncoder",
    "java/nio/channels/Desugar*",
    "java/nio/channels/AsynchronousChannel",
    "java/nio/channels/AsynchronousFileChannel",
    "java/nio/channels/CompletionHandler",
    "java/nio/channels/FileChannel",
    "java/nio/channels/SeekableByteChannel",
    "java/nio/charset/*",
    "java/nio/file/*",
    "java/time/*",
    "java/util/AbstractList",
    "java/util/CollSer",
    "java/util/Collection",
    "java/util/Comparator",
    "java/util/Comparators",
    "java/util/Deque",
    "java/util/Desugar*",
    "java/util/DoubleSummaryStatistics",
    "java/util/ImmutableCollections",
    "java/util/IntSummaryStatistics",
    "java/util/Iterator",
    "java/util/KeyValueHolder",
    "java/util/List",
    "java/util/ListIterator",
    "java/util/LongSummaryStatistics",
    "java/util/Map",
    "java/util/NavigableMap",
    "java/util/NavigableSet",
    "java/util/Objects",
    "java/util/Optional*",
    "java/util/PrimitiveIterator",
    "java/util/Queue",
    "java/util/Set",
    "java/util/SortedMap",
    "java/util/SortedSet",
    "java/util/Spliterator",
    "java/util/Spliterators",
    "java/util/StringJoiner",
    "java/util/Tripwire",
    "java/util/concurrent/BlockingDeque",
    "java/util/concurrent/BlockingQueue",
    "java/util/concurrent/CompletableFuture",
    "java/util/concurrent/ConcurrentHashMap",
    "java/util/concurrent/ConcurrentLinkedDeque",
    "java/util/concurrent/ConcurrentLinkedQueue",
    "java/util/concurrent/ConcurrentMap",
    "java/util/concurrent/ConcurrentNavigableMap",
    "java/util/concurrent/CountedCompleter",
    "java/util/concurrent/Desugar*",
    "java/util/concurrent/Exchanger",
    "java/util/concurrent/Flow",
    "java/util/concurrent/ForkJoinPool",
    "java/util/concurrent/ForkJoinTask",
    "java/util/concurrent/FutureTask",
    "java/util/concurrent/Helpers",
    "java/util/concurrent/LinkedTransferQueue",
    "java/util/concurrent/Phaser",
    "java/util/concurrent/SubmissionPublisher",
    "java/util/concurrent/SynchronousQueue",
    "java/util/concurrent/ThreadLocalRandom",
    "java/util/concurrent/TransferQueue",
    "java/util/concurrent/atomic/Desugar*",
    "java/util/function/*",
    "java/util/stream/*",
    "sun/misc/Desugar*",
    "sun/nio/*",
    "sun/security/action/*",
    "sun/util/PreHashedMap",
    "jdk/internal/util/StaticProperty",
    "jdk/internal/util/Preconditions",
];

const ANDROID_CONCURRENT_FIX_LIB_TOP_LEVEL_TYPE_PATTERNS: &[&str] = &[
    "java/io/BufferedInputStream",
    "java/util/concurrent/CompletableFuture",
    "java/util/concurrent/ConcurrentHashMap",
    "java/util/concurrent/ConcurrentLinkedDeque",
    "java/util/concurrent/ConcurrentLinkedQueue",
    "java/util/concurrent/CountedCompleter",
    "java/util/concurrent/Exchanger",
    "java/util/concurrent/ForkJoinPool",
    "java/util/concurrent/ForkJoinTask",
    "java/util/concurrent/FutureTask",
    "java/util/concurrent/Helpers",
    "java/util/concurrent/LinkedTransferQueue",
    "java/util/concurrent/Phaser",
    "java/util/concurrent/SynchronousQueue",
    "java/util/concurrent/ThreadLocalRandom",
    "sun/misc/Desugar*",
];

/// A built-in build configuration, selecting a list of top-level type patterns.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default, Display)]
pub enum BuildConfig {
    /// The library classes desugared by D8 for JDK 11.
    #[default]
    #[display("d8_desugar")]
    D8Desugar,
    /// The concurrency classes patched for Android.
    #[display("android_fix_libs")]
    AndroidFixLibs,
}

impl BuildConfig {
    /// The top-level type patterns of this configuration.
    #[must_use]
    pub fn top_level_type_patterns(self) -> &'static [&'static str] {
        match self {
            Self::D8Desugar => D8_ANDROID_JDK11_LIB_TOP_LEVEL_TYPE_PATTERNS,
            Self::AndroidFixLibs => ANDROID_CONCURRENT_FIX_LIB_TOP_LEVEL_TYPE_PATTERNS,
        }
    }
}

impl FromStr for BuildConfig {
    type Err = DesugarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "d8_desugar" => Ok(Self::D8Desugar),
            "android_fix_libs" => Ok(Self::AndroidFixLibs),
            other => Err(DesugarError::UnknownConfig(other.to_owned())),
        }
    }
}

/// What happens to class entries that no top-level type pattern selects.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum UnselectedClassPolicy {
    /// The entry is written to the output unchanged.
    #[default]
    CopyThrough,
    /// The entry is left out of the output.
    Drop,
}

/// The options of a desugaring run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesugarOptions {
    /// Top-level type patterns. `X*` selects every class entry starting with `X`; any other `X`
    /// selects `X.class` and its nested classes `X$*.class`.
    pub top_level_type_patterns: Vec<String>,
    /// Internal names of the annotations marking supported members.
    pub supported_api_annotations: BTreeSet<String>,
    /// Descriptors of the annotations removed from written classes.
    pub omitted_annotations: BTreeSet<String>,
    /// Owners whose method invocations may be retargeted to companions; `None` allows any owner.
    pub retargeting_owners: Option<BTreeSet<String>>,
    /// Internal type names substituted wherever they appear in written classes.
    pub type_replacements: BTreeMap<String, String>,
    /// What happens to unselected class entries.
    pub unselected_classes: UnselectedClassPolicy,
}

impl DesugarOptions {
    /// Creates the options of a built-in configuration.
    #[must_use]
    pub fn from_config(config: BuildConfig) -> Self {
        Self::with_patterns(config.top_level_type_patterns().iter().copied())
    }

    /// Creates options with the given patterns and the default annotation sets.
    pub fn with_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            top_level_type_patterns: patterns.into_iter().map(Into::into).collect(),
            supported_api_annotations: [
                API_GENERATING_ANNOTATION,
                INTO_DESUGAR_EXTENDED_CLASS_ANNOTATION,
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            omitted_annotations: OMITTED_ANNOTATIONS.into_iter().map(str::to_owned).collect(),
            retargeting_owners: None,
            type_replacements: BTreeMap::new(),
            unselected_classes: UnselectedClassPolicy::default(),
        }
    }
}

impl Default for DesugarOptions {
    fn default() -> Self {
        Self::from_config(BuildConfig::default())
    }
}
