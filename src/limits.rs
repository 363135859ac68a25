//! Ceilings on the size of a calculation.
use crate::error::HazardError;
use crate::units::{OutputWeight, SourceWeight};
use crate::weight::JobInfo;

/// Optional limits on the input and output weight. Unset means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightLimits {
    /// Maximum total weight of the sources
    pub max_input_weight: Option<SourceWeight>,
    /// Maximum expected output size
    pub max_output_weight: Option<OutputWeight>,
}

impl WeightLimits {
    /// Compare the weights of a job against the limits.
    ///
    /// The input weight is checked first, so if both limits are exceeded only the input one is
    /// reported.
    pub fn check(&self, info: &JobInfo) -> Result<(), HazardError> {
        if let Some(limit) = self.max_input_weight
            && info.input_weight > limit
        {
            return Err(HazardError::InputWeightLimitExceeded {
                weight: info.input_weight,
                limit,
            });
        }

        if let Some(limit) = self.max_output_weight
            && info.output_weight > limit
        {
            return Err(HazardError::OutputWeightLimitExceeded {
                weight: info.output_weight,
                limit,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn job_info(input_weight: f64, output_weight: f64) -> JobInfo {
        JobInfo {
            num_sites: 1,
            num_realizations: 1,
            num_imts: 1,
            num_levels: 1.0,
            input_weight: SourceWeight(input_weight),
            output_weight: OutputWeight(output_weight),
        }
    }

    #[test]
    fn test_check_unlimited() {
        assert!(WeightLimits::default().check(&job_info(1e12, 1e12)).is_ok());
    }

    #[test]
    fn test_check_input_weight_exceeded() {
        let limits = WeightLimits {
            max_input_weight: Some(SourceWeight(100.0)),
            max_output_weight: None,
        };
        let err = limits.check(&job_info(150.0, 1.0)).unwrap_err();
        assert!(matches!(
            err,
            HazardError::InputWeightLimitExceeded { weight, limit }
                if weight == SourceWeight(150.0) && limit == SourceWeight(100.0)
        ));
    }

    #[rstest]
    #[case(50.0, true)]
    #[case(100.0, true)] // Limit is inclusive
    #[case(100.5, false)]
    fn test_check_output_weight(#[case] output_weight: f64, #[case] expected_ok: bool) {
        let limits = WeightLimits {
            max_input_weight: Some(SourceWeight(100.0)),
            max_output_weight: Some(OutputWeight(100.0)),
        };
        let result = limits.check(&job_info(10.0, output_weight));
        assert_eq!(result.is_ok(), expected_ok);
        if !expected_ok {
            assert!(matches!(
                result,
                Err(HazardError::OutputWeightLimitExceeded { .. })
            ));
        }
    }
}
