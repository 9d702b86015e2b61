//! The builtin function library.
//!
//! Builtins are called by the `function` and `functionSmall` instructions
//! with a numeric id and an arity. Each [`Builtin`] carries its name, the
//! arities it accepts, whether it is an aggregate (the accumulator state is
//! its first argument) and the native routine implementing it.
//!
//! Routines are organized by category:
//! - `collection`: Arrays and objects
//! - `set`: Set algebra over arrays
//! - `math`: Numeric functions
//! - `string`: String functions
//! - `regex`: Regular expressions
//! - `date`: Date parts and calendar arithmetic
//! - `misc`: Type matching, hashing and sort keys
//! - `double_double`: Compensated summation
//! - `accumulator`: Group accumulators
//! - `multi`: N-element accumulators, removable ones included
//! - `window`: Removable window accumulators
//! - `series`: Integral, derivative and linear fill

#[allow(clippy::unnecessary_wraps)]
mod accumulator;
#[allow(clippy::unnecessary_wraps)]
mod collection;
#[allow(clippy::unnecessary_wraps)]
mod date;
#[allow(clippy::unnecessary_wraps)]
mod double_double;
#[allow(clippy::unnecessary_wraps)]
mod math;
#[allow(clippy::unnecessary_wraps)]
mod misc;
mod multi;
#[allow(clippy::unnecessary_wraps)]
mod regex;
mod series;
#[allow(clippy::unnecessary_wraps)]
mod set;
mod state;
#[allow(clippy::unnecessary_wraps)]
#[allow(clippy::redundant_closure_for_method_calls)]
mod string;
mod window;

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use docvm_foundation::{Collator, Error, ErrorContext, Operand, Result, Value};

pub use double_double::DoubleDouble;

/// Signature shared by every builtin routine.
pub type BuiltinFn = fn(&mut Args) -> Result<Operand>;

/// Arities accepted by a builtin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many arguments.
    Exact(u32),
    /// Between the bounds, inclusive.
    Range(u32, u32),
    /// At least this many arguments.
    AtLeast(u32),
}

impl Arity {
    /// Returns true if `n` arguments are accepted.
    #[must_use]
    pub const fn accepts(self, n: u32) -> bool {
        match self {
            Self::Exact(k) => n == k,
            Self::Range(lo, hi) => lo <= n && n <= hi,
            Self::AtLeast(k) => n >= k,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(k) => write!(f, "{k}"),
            Self::Range(lo, hi) => write!(f, "{lo} to {hi}"),
            Self::AtLeast(k) => write!(f, "at least {k}"),
        }
    }
}

/// Arguments of a builtin call, in call order.
#[derive(Debug, Default)]
pub struct Args {
    values: SmallVec<[Operand; 4]>,
}

impl Args {
    /// Creates an argument list.
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = Operand>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value of argument `i`, Nothing when absent.
    #[must_use]
    pub fn get(&self, i: usize) -> &Value {
        const NOTHING: &Value = &Value::Nothing;
        self.values.get(i).map_or(NOTHING, Operand::value)
    }

    /// Argument `i` if it was supplied.
    #[must_use]
    pub fn get_opt(&self, i: usize) -> Option<&Value> {
        self.values.get(i).map(Operand::value)
    }

    /// Moves argument `i` out, leaving Nothing behind.
    pub fn take(&mut self, i: usize) -> Operand {
        self.values.get_mut(i).map(Operand::take).unwrap_or_default()
    }

    /// Moves argument `i` out as a value the caller may modify.
    pub fn take_value(&mut self, i: usize) -> Value {
        self.take(i).into_owned()
    }

    /// Iterates the argument values.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().map(Operand::value)
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values.into_iter().map(Operand::Owned))
    }
}

pub(crate) fn owned(value: Value) -> Result<Operand> {
    Ok(Operand::Owned(value))
}

pub(crate) fn nothing() -> Result<Operand> {
    owned(Value::Nothing)
}

/// The collator handle held by `value`, if any.
pub(crate) fn collator_arg(value: &Value) -> Option<Arc<dyn Collator>> {
    match value {
        Value::Collator(c) => Some(Arc::clone(c)),
        _ => None,
    }
}

macro_rules! builtins {
    ($($variant:ident = $name:literal, $arity:expr, $agg:literal, $handler:path;)*) => {
        /// A builtin function id.
        ///
        /// The discriminant is the id encoded in the instruction stream.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Builtin {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )*
        }

        impl Builtin {
            /// Every builtin, in id order.
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant,)*];

            /// The builtin's name.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name,)*
                }
            }

            /// Arities the builtin accepts.
            #[must_use]
            pub const fn arity(self) -> Arity {
                #[allow(clippy::enum_glob_use)]
                use Arity::*;
                match self {
                    $(Builtin::$variant => $arity,)*
                }
            }

            /// Returns true if the first argument is accumulator state.
            #[must_use]
            pub const fn is_aggregate(self) -> bool {
                match self {
                    $(Builtin::$variant => $agg,)*
                }
            }

            fn handler(self) -> BuiltinFn {
                match self {
                    $(Builtin::$variant => $handler,)*
                }
            }
        }
    };
}

builtins! {
    // === Arrays and Objects ===
    NewArray = "newArray", AtLeast(0), false, collection::new_array;
    NewArrayFromRange = "newArrayFromRange", Exact(3), false, collection::new_array_from_range;
    NewObj = "newObj", AtLeast(0), false, collection::new_obj;
    KeepFields = "keepFields", AtLeast(1), false, collection::keep_fields;
    DropFields = "dropFields", AtLeast(1), false, collection::drop_fields;
    ObjectToArray = "objectToArray", Exact(1), false, collection::object_to_array;
    ArrayToObject = "arrayToObject", Exact(1), false, collection::array_to_object;
    MergeObjects = "mergeObjects", Exact(2), true, accumulator::merge_objects;
    ConcatArrays = "concatArrays", AtLeast(0), false, collection::concat_arrays;
    ExtractSubArray = "extractSubArray", Range(2, 3), false, collection::extract_sub_array;
    IsArrayEmpty = "isArrayEmpty", Exact(1), false, collection::is_array_empty;
    ReverseArray = "reverseArray", Exact(1), false, collection::reverse_array;
    SortArray = "sortArray", Range(2, 3), false, collection::sort_array;
    IsMember = "isMember", Exact(2), false, collection::is_member;
    CollIsMember = "collIsMember", Exact(3), false, collection::coll_is_member;

    // === Sets ===
    SetUnion = "setUnion", AtLeast(0), false, set::set_union;
    SetIntersection = "setIntersection", AtLeast(0), false, set::set_intersection;
    SetDifference = "setDifference", Exact(2), false, set::set_difference;
    SetEquals = "setEquals", AtLeast(2), false, set::set_equals;
    SetIsSubset = "setIsSubset", Exact(2), false, set::set_is_subset;
    CollSetUnion = "collSetUnion", AtLeast(1), false, set::coll_set_union;
    CollSetIntersection = "collSetIntersection", AtLeast(1), false, set::coll_set_intersection;
    CollSetDifference = "collSetDifference", Exact(3), false, set::coll_set_difference;
    CollSetEquals = "collSetEquals", AtLeast(3), false, set::coll_set_equals;
    CollSetIsSubset = "collSetIsSubset", Exact(3), false, set::coll_set_is_subset;

    // === Math ===
    Abs = "abs", Exact(1), false, math::abs;
    Ceil = "ceil", Exact(1), false, math::ceil;
    Floor = "floor", Exact(1), false, math::floor;
    Trunc = "trunc", Range(1, 2), false, math::trunc;
    Round = "round", Range(1, 2), false, math::round;
    Exp = "exp", Exact(1), false, math::exp;
    Ln = "ln", Exact(1), false, math::ln;
    Log10 = "log10", Exact(1), false, math::log10;
    Sqrt = "sqrt", Exact(1), false, math::sqrt;
    Pow = "pow", Exact(2), false, math::pow;
    Acos = "acos", Exact(1), false, math::acos;
    Acosh = "acosh", Exact(1), false, math::acosh;
    Asin = "asin", Exact(1), false, math::asin;
    Asinh = "asinh", Exact(1), false, math::asinh;
    Atan = "atan", Exact(1), false, math::atan;
    Atanh = "atanh", Exact(1), false, math::atanh;
    Atan2 = "atan2", Exact(2), false, math::atan2;
    Cos = "cos", Exact(1), false, math::cos;
    Cosh = "cosh", Exact(1), false, math::cosh;
    Sin = "sin", Exact(1), false, math::sin;
    Sinh = "sinh", Exact(1), false, math::sinh;
    Tan = "tan", Exact(1), false, math::tan;
    Tanh = "tanh", Exact(1), false, math::tanh;
    DegreesToRadians = "degreesToRadians", Exact(1), false, math::degrees_to_radians;
    RadiansToDegrees = "radiansToDegrees", Exact(1), false, math::radians_to_degrees;
    BitTestZero = "bitTestZero", Exact(2), false, math::bit_test_zero;
    BitTestMask = "bitTestMask", Exact(2), false, math::bit_test_mask;
    BitTestPosition = "bitTestPosition", Exact(2), false, math::bit_test_position;

    // === Strings ===
    Split = "split", Exact(2), false, string::split;
    StrLenBytes = "strLenBytes", Exact(1), false, string::str_len_bytes;
    StrLenCP = "strLenCP", Exact(1), false, string::str_len_cp;
    ToUpper = "toUpper", Exact(1), false, string::to_upper;
    ToLower = "toLower", Exact(1), false, string::to_lower;
    Concat = "concat", AtLeast(0), false, string::concat;
    Trim = "trim", Range(1, 2), false, string::trim;
    Ltrim = "ltrim", Range(1, 2), false, string::ltrim;
    Rtrim = "rtrim", Range(1, 2), false, string::rtrim;
    IndexOfBytes = "indexOfBytes", Range(2, 4), false, string::index_of_bytes;
    IndexOfCP = "indexOfCP", Range(2, 4), false, string::index_of_cp;
    ReplaceOne = "replaceOne", Exact(3), false, string::replace_one;
    HasNullBytes = "hasNullBytes", Exact(1), false, string::has_null_bytes;
    CoerceToBool = "coerceToBool", Exact(1), false, string::coerce_to_bool;
    CoerceToString = "coerceToString", Exact(1), false, string::coerce_to_string;

    // === Regular Expressions ===
    RegexCompile = "regexCompile", Exact(2), false, regex::regex_compile;
    RegexMatch = "regexMatch", Exact(2), false, regex::regex_match;
    RegexFind = "regexFind", Exact(2), false, regex::regex_find;
    RegexFindAll = "regexFindAll", Exact(2), false, regex::regex_find_all;
    GetRegexPattern = "getRegexPattern", Exact(1), false, regex::get_regex_pattern;
    GetRegexFlags = "getRegexFlags", Exact(1), false, regex::get_regex_flags;

    // === Dates ===
    Year = "year", Range(1, 3), false, date::year;
    Month = "month", Range(1, 3), false, date::month;
    Hour = "hour", Range(1, 3), false, date::hour;
    Minute = "minute", Range(1, 3), false, date::minute;
    Second = "second", Range(1, 3), false, date::second;
    Millisecond = "millisecond", Range(1, 3), false, date::millisecond;
    DayOfYear = "dayOfYear", Range(1, 3), false, date::day_of_year;
    DayOfMonth = "dayOfMonth", Range(1, 3), false, date::day_of_month;
    DayOfWeek = "dayOfWeek", Range(1, 3), false, date::day_of_week;
    Week = "week", Range(1, 3), false, date::week;
    IsoWeekYear = "isoWeekYear", Range(1, 3), false, date::iso_week_year;
    IsoDayOfWeek = "isoDayOfWeek", Range(1, 3), false, date::iso_day_of_week;
    IsoWeek = "isoWeek", Range(1, 3), false, date::iso_week;
    DateAdd = "dateAdd", Range(4, 5), false, date::date_add;
    DateDiff = "dateDiff", Range(4, 6), false, date::date_diff;
    DateTrunc = "dateTrunc", Range(4, 6), false, date::date_trunc;
    DateToParts = "dateToParts", Range(3, 4), false, date::date_to_parts;
    IsTimeUnit = "isTimeUnit", Exact(1), false, date::is_time_unit;
    IsTimezone = "isTimezone", Range(1, 2), false, date::is_timezone;
    IsDayOfWeek = "isDayOfWeek", Exact(1), false, date::is_day_of_week;
    TsSecond = "tsSecond", Exact(1), false, date::ts_second;
    TsIncrement = "tsIncrement", Exact(1), false, date::ts_increment;

    // === Miscellaneous ===
    TypeMatch = "typeMatch", Exact(2), false, misc::type_match;
    Hash = "hash", AtLeast(0), false, misc::hash;
    GenerateSortKey = "generateSortKey", Range(2, 3), false, misc::generate_sort_key;
    SortKeyComponentVectorGetElement = "sortKeyComponentVectorGetElement", Exact(2), false,
        misc::sort_key_component_vector_get_element;
    SortKeyComponentVectorToArray = "sortKeyComponentVectorToArray", Exact(1), false,
        misc::sort_key_component_vector_to_array;

    // === Compensated Sums ===
    DoubleDoubleSum = "doubleDoubleSum", AtLeast(1), false, double_double::double_double_sum;
    AggDoubleDoubleSum = "aggDoubleDoubleSum", Exact(2), true, double_double::agg_double_double_sum;
    DoubleDoubleSumFinalize = "doubleDoubleSumFinalize", Exact(1), false,
        double_double::double_double_sum_finalize;
    DoubleDoublePartialSumFinalize = "doubleDoublePartialSumFinalize", Exact(1), false,
        double_double::double_double_partial_sum_finalize;
    AggMergeDoubleDoubleSums = "aggMergeDoubleDoubleSums", Exact(2), true,
        double_double::agg_merge_double_double_sums;

    // === Standard Deviation ===
    AggStdDev = "aggStdDev", Exact(2), true, accumulator::agg_std_dev;
    AggMergeStdDevs = "aggMergeStdDevs", Exact(2), true, accumulator::agg_merge_std_devs;
    StdDevPopFinalize = "stdDevPopFinalize", Exact(1), false, accumulator::std_dev_pop_finalize;
    StdDevSampFinalize = "stdDevSampFinalize", Exact(1), false, accumulator::std_dev_samp_finalize;

    // === Collection Accumulators ===
    AddToArray = "addToArray", Exact(2), true, accumulator::add_to_array;
    AddToArrayCapped = "addToArrayCapped", Exact(3), true, accumulator::add_to_array_capped;
    AddToSet = "addToSet", Exact(2), true, accumulator::add_to_set;
    AddToSetCapped = "addToSetCapped", Exact(3), true, accumulator::add_to_set_capped;
    CollAddToSet = "collAddToSet", Exact(3), true, accumulator::coll_add_to_set;
    CollAddToSetCapped = "collAddToSetCapped", Exact(4), true, accumulator::coll_add_to_set_capped;
    AggConcatArraysCapped = "aggConcatArraysCapped", Exact(3), true,
        accumulator::agg_concat_arrays_capped;
    AggSetUnion = "aggSetUnion", Exact(2), true, accumulator::agg_set_union;
    AggSetUnionCapped = "aggSetUnionCapped", Exact(3), true, accumulator::agg_set_union_capped;
    AggCollSetUnionCapped = "aggCollSetUnionCapped", Exact(4), true,
        accumulator::agg_coll_set_union_capped;

    // === N Accumulators ===
    AggMultiInit = "aggMultiInit", Range(1, 2), false, multi::agg_multi_init;
    AggFirstNNeedsMoreInput = "aggFirstNNeedsMoreInput", Exact(1), false,
        multi::agg_first_n_needs_more_input;
    AggFirstN = "aggFirstN", Exact(2), true, multi::agg_first_n;
    AggFirstNMerge = "aggFirstNMerge", Exact(2), true, multi::agg_first_n_merge;
    AggFirstNFinalize = "aggFirstNFinalize", Exact(1), false, multi::agg_first_n_finalize;
    AggLastN = "aggLastN", Exact(2), true, multi::agg_last_n;
    AggLastNMerge = "aggLastNMerge", Exact(2), true, multi::agg_last_n_merge;
    AggLastNFinalize = "aggLastNFinalize", Exact(1), false, multi::agg_last_n_finalize;
    AggTopN = "aggTopN", Exact(4), true, multi::agg_top_n;
    AggTopNMerge = "aggTopNMerge", Exact(3), true, multi::agg_top_n_merge;
    AggTopNFinalize = "aggTopNFinalize", Exact(2), false, multi::agg_top_n_finalize;
    AggBottomN = "aggBottomN", Exact(4), true, multi::agg_bottom_n;
    AggBottomNMerge = "aggBottomNMerge", Exact(3), true, multi::agg_bottom_n_merge;
    AggBottomNFinalize = "aggBottomNFinalize", Exact(2), false, multi::agg_bottom_n_finalize;
    AggMinN = "aggMinN", Exact(2), true, multi::agg_min_n;
    AggMinNMerge = "aggMinNMerge", Range(2, 3), true, multi::agg_min_n_merge;
    AggMinNFinalize = "aggMinNFinalize", Range(1, 2), false, multi::agg_min_n_finalize;
    AggMaxN = "aggMaxN", Exact(2), true, multi::agg_max_n;
    AggMaxNMerge = "aggMaxNMerge", Range(2, 3), true, multi::agg_max_n_merge;
    AggMaxNFinalize = "aggMaxNFinalize", Range(1, 2), false, multi::agg_max_n_finalize;
    AggCollMinN = "aggCollMinN", Exact(3), true, multi::agg_coll_min_n;
    AggCollMaxN = "aggCollMaxN", Exact(3), true, multi::agg_coll_max_n;

    // === Rank and Moving Average ===
    AggRank = "aggRank", Exact(2), true, window::agg_rank;
    AggRankColl = "aggRankColl", Exact(3), true, window::agg_rank_coll;
    AggDenseRank = "aggDenseRank", Exact(2), true, window::agg_dense_rank;
    AggDenseRankColl = "aggDenseRankColl", Exact(3), true, window::agg_dense_rank_coll;
    AggRankFinalize = "aggRankFinalize", Exact(1), false, window::agg_rank_finalize;
    AggExpMovingAvgInit = "aggExpMovingAvgInit", Exact(1), false, window::agg_exp_moving_avg_init;
    AggExpMovingAvg = "aggExpMovingAvg", Exact(2), true, window::agg_exp_moving_avg;
    AggExpMovingAvgFinalize = "aggExpMovingAvgFinalize", Exact(1), false,
        window::agg_exp_moving_avg_finalize;

    // === Removable Window Accumulators ===
    AggRemovableSumInit = "aggRemovableSumInit", Exact(0), false, window::agg_removable_sum_init;
    AggRemovableSumAdd = "aggRemovableSumAdd", Exact(2), true, window::agg_removable_sum_add;
    AggRemovableSumRemove = "aggRemovableSumRemove", Exact(2), true,
        window::agg_removable_sum_remove;
    AggRemovableSumFinalize = "aggRemovableSumFinalize", Exact(1), false,
        window::agg_removable_sum_finalize;
    AggRemovableStdDevInit = "aggRemovableStdDevInit", Exact(0), false,
        window::agg_removable_std_dev_init;
    AggRemovableStdDevAdd = "aggRemovableStdDevAdd", Exact(2), true,
        window::agg_removable_std_dev_add;
    AggRemovableStdDevRemove = "aggRemovableStdDevRemove", Exact(2), true,
        window::agg_removable_std_dev_remove;
    AggRemovableStdDevSampFinalize = "aggRemovableStdDevSampFinalize", Exact(1), false,
        window::agg_removable_std_dev_samp_finalize;
    AggRemovableStdDevPopFinalize = "aggRemovableStdDevPopFinalize", Exact(1), false,
        window::agg_removable_std_dev_pop_finalize;
    AggCovarianceInit = "aggCovarianceInit", Exact(0), false, window::agg_covariance_init;
    AggCovarianceAdd = "aggCovarianceAdd", Exact(3), true, window::agg_covariance_add;
    AggCovarianceRemove = "aggCovarianceRemove", Exact(3), true, window::agg_covariance_remove;
    AggCovarianceSampFinalize = "aggCovarianceSampFinalize", Exact(1), false,
        window::agg_covariance_samp_finalize;
    AggCovariancePopFinalize = "aggCovariancePopFinalize", Exact(1), false,
        window::agg_covariance_pop_finalize;
    AggRemovablePushInit = "aggRemovablePushInit", Exact(0), false, window::agg_removable_push_init;
    AggRemovablePushAdd = "aggRemovablePushAdd", Exact(2), true, window::agg_removable_push_add;
    AggRemovablePushRemove = "aggRemovablePushRemove", Exact(1), true,
        window::agg_removable_push_remove;
    AggRemovablePushFinalize = "aggRemovablePushFinalize", Exact(1), false,
        window::agg_removable_push_finalize;
    AggRemovableAddToSetInit = "aggRemovableAddToSetInit", Range(0, 2), false,
        window::agg_removable_add_to_set_init;
    AggRemovableAddToSetAdd = "aggRemovableAddToSetAdd", Exact(2), true,
        window::agg_removable_add_to_set_add;
    AggRemovableAddToSetRemove = "aggRemovableAddToSetRemove", Exact(2), true,
        window::agg_removable_add_to_set_remove;
    AggRemovableAddToSetFinalize = "aggRemovableAddToSetFinalize", Exact(1), false,
        window::agg_removable_add_to_set_finalize;

    // === Time Series Windows ===
    AggIntegralInit = "aggIntegralInit", Exact(1), false, series::agg_integral_init;
    AggIntegralAdd = "aggIntegralAdd", Exact(3), true, series::agg_integral_add;
    AggIntegralRemove = "aggIntegralRemove", Exact(3), true, series::agg_integral_remove;
    AggIntegralFinalize = "aggIntegralFinalize", Exact(1), false, series::agg_integral_finalize;
    AggDerivativeInit = "aggDerivativeInit", Exact(1), false, series::agg_derivative_init;
    AggDerivativeAdd = "aggDerivativeAdd", Exact(3), true, series::agg_derivative_add;
    AggDerivativeRemove = "aggDerivativeRemove", Exact(3), true, series::agg_derivative_remove;
    AggDerivativeFinalize = "aggDerivativeFinalize", Exact(1), false,
        series::agg_derivative_finalize;
    AggLinearFillInit = "aggLinearFillInit", Exact(0), false, series::agg_linear_fill_init;
    AggLinearFillCanAdd = "aggLinearFillCanAdd", Exact(1), false, series::agg_linear_fill_can_add;
    AggLinearFillAdd = "aggLinearFillAdd", Exact(3), true, series::agg_linear_fill_add;
    AggLinearFillFinalize = "aggLinearFillFinalize", Exact(2), false,
        series::agg_linear_fill_finalize;

    // === Removable N Accumulators ===
    AggRemovableMinMaxNInit = "aggRemovableMinMaxNInit", Range(1, 2), false,
        multi::agg_removable_min_max_n_init;
    AggRemovableMinNAdd = "aggRemovableMinNAdd", Exact(2), true, multi::agg_removable_min_n_add;
    AggRemovableMinNRemove = "aggRemovableMinNRemove", Exact(2), true,
        multi::agg_removable_min_n_remove;
    AggRemovableMinNFinalize = "aggRemovableMinNFinalize", Exact(1), false,
        multi::agg_removable_min_n_finalize;
    AggRemovableMaxNAdd = "aggRemovableMaxNAdd", Exact(2), true, multi::agg_removable_max_n_add;
    AggRemovableMaxNRemove = "aggRemovableMaxNRemove", Exact(2), true,
        multi::agg_removable_max_n_remove;
    AggRemovableMaxNFinalize = "aggRemovableMaxNFinalize", Exact(1), false,
        multi::agg_removable_max_n_finalize;
    AggRemovableTopNInit = "aggRemovableTopNInit", Range(1, 2), false,
        multi::agg_removable_top_n_init;
    AggRemovableTopNAdd = "aggRemovableTopNAdd", Exact(4), true, multi::agg_removable_top_n_add;
    AggRemovableTopNRemove = "aggRemovableTopNRemove", Exact(4), true,
        multi::agg_removable_top_n_remove;
    AggRemovableTopNFinalize = "aggRemovableTopNFinalize", Exact(2), false,
        multi::agg_removable_top_n_finalize;
    AggRemovableBottomNFinalize = "aggRemovableBottomNFinalize", Exact(2), false,
        multi::agg_removable_bottom_n_finalize;
}

impl Builtin {
    /// Decodes a builtin id.
    #[must_use]
    pub fn from_u16(id: u16) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    /// Looks a builtin up by name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }

    /// Invokes the builtin.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the argument count is outside the
    /// builtin's arity, and whatever error the routine raises.
    pub fn call(self, mut args: Args) -> Result<Operand> {
        let n = u32::try_from(args.len()).unwrap_or(u32::MAX);
        if !self.arity().accepts(n) {
            return Err(Error::internal(format!(
                "{} expects {} arguments, got {n}",
                self.name(),
                self.arity()
            ))
            .with_context(ErrorContext::new().with_builtin(self.name())));
        }
        (self.handler())(&mut args).map_err(|e| e.with_context(ErrorContext::new().with_builtin(self.name())))
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
