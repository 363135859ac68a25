//! This module defines the weight types used to estimate the cost of a calculation.
//!
//! Weights are pure numbers used for sizing and limits, never exact counts. Keeping the input and
//! output weights as separate types stops one being compared against the other's limit.
use serde::{Deserialize, Serialize};
use std::iter::Sum;

macro_rules! weight_struct {
    ($name:ident) => {
        /// Represents a type of weight.
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            PartialOrd,
            Serialize,
            Deserialize,
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::Display,
        )]
        pub struct $name(pub f64);

        impl $name {
            /// Creates a new instance of the weight type from a f64 value.
            pub fn new(val: f64) -> Self {
                Self(val)
            }

            /// Returns the value of the weight as a f64.
            pub fn value(self) -> f64 {
                self.0
            }
        }

        impl std::ops::Mul<f64> for $name {
            type Output = $name;
            fn mul(self, rhs: f64) -> $name {
                $name(self.0 * rhs)
            }
        }

        impl std::ops::Div for $name {
            type Output = f64;
            fn div(self, rhs: $name) -> f64 {
                self.0 / rhs.0
            }
        }

        impl Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                $name(iter.map(|w| w.0).sum())
            }
        }

        impl<'a> Sum<&'a $name> for $name {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                $name(iter.map(|w| w.0).sum())
            }
        }
    };
}

// The cost of processing a source, in ruptures
weight_struct!(SourceWeight);
// The expected size of the output
weight_struct!(OutputWeight);
