//! Test statistics for differential expression

mod ftest;

pub use ftest::{flat_ftest, ftest_pvalues, tuned_f, FTest, StatisticTable, STAT_SENTINEL};
