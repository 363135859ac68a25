//! Fixtures for tests
use crate::geo::Point;
use crate::ground_motion::GmmCoefficients;
use crate::model::Model;
use crate::model::parameters::{CalculationMode, JobParameters};
use crate::realization::Realization;
use crate::site::{Site, SiteCollection};
use crate::source::{Mfd, Source, SourceGeometry};
use indexmap::{IndexMap, indexmap};
use rstest::fixture;
use std::path::PathBuf;
use std::sync::Arc;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

fn incremental_mfd() -> Mfd {
    Mfd::Incremental {
        min_mag: 5.0,
        bin_width: 0.1,
        occurrence_rates: vec![0.01, 0.005, 0.002],
    }
}

#[fixture]
pub fn job_parameters() -> JobParameters {
    let coefficients = |c0, sigma| GmmCoefficients {
        c0,
        c1: 0.9,
        c2: -1.2,
        c3: 10.0,
        sigma,
    };

    JobParameters {
        description: "Test job".into(),
        calculation_mode: CalculationMode::Classical,
        investigation_time: 50.0,
        intensity_measure_types_and_levels: indexmap! {
            "PGA".into() => vec![0.05, 0.1, 0.2],
            "SA(0.1)".into() => vec![0.05, 0.1, 0.2, 0.4, 0.8],
        },
        maximum_distance: 200.0,
        area_source_discretization: 10.0,
        width_of_mfd_bin: 0.1,
        point_source_weight: 1.0 / 40.0,
        number_of_logic_tree_samples: 0,
        ses_per_logic_tree_path: 1,
        mean_hazard_curves: false,
        quantile_hazard_curves: Vec::new(),
        poes: Vec::new(),
        poes_disagg: Vec::new(),
        individual_curves: true,
        tiling: None,
        gsims: indexmap! {
            "Simple".into() => indexmap! {
                "PGA".into() => coefficients(-3.5, 0.6),
                "SA(0.1)".into() => coefficients(-3.0, 0.7),
            },
        },
    }
}

#[fixture]
pub fn point_source() -> Source {
    Source {
        id: "point1".into(),
        name: "Point source".into(),
        trt_model: "active".into(),
        geometry: SourceGeometry::Point(Point::new(0.05, 0.05)),
        depth: 10.0,
        mfd: incremental_mfd(),
    }
}

#[fixture]
pub fn area_source() -> Source {
    Source {
        id: "area1".into(),
        name: "Area source".into(),
        trt_model: "stable".into(),
        geometry: SourceGeometry::Area(vec![
            Point::new(1.0, 0.0),
            Point::new(1.5, 0.0),
            Point::new(1.5, 0.5),
            Point::new(1.0, 0.5),
        ]),
        depth: 15.0,
        mfd: incremental_mfd(),
    }
}

#[fixture]
pub fn sites() -> SiteCollection {
    SiteCollection::new(
        [("site1", 0.0, 0.0), ("site2", 0.1, 0.1), ("site3", 0.5, 0.2)]
            .into_iter()
            .map(|(id, lon, lat)| Site {
                id: id.into(),
                location: Point::new(lon, lat),
            })
            .collect(),
    )
}

#[fixture]
pub fn realizations() -> Vec<Realization> {
    [("rlz1", 0.6), ("rlz2", 0.4)]
        .into_iter()
        .map(|(id, weight)| Realization {
            id: id.into(),
            weight: Some(weight),
            gsim_by_trt: IndexMap::from([
                ("active".into(), "Simple".into()),
                ("stable".into(), "Simple".into()),
            ]),
        })
        .collect()
}

#[fixture]
pub fn model(
    job_parameters: JobParameters,
    point_source: Source,
    area_source: Source,
    sites: SiteCollection,
    realizations: Vec<Realization>,
) -> Model {
    Model {
        job_dir: PathBuf::from("job"),
        parameters: job_parameters,
        source_groups: indexmap! {
            point_source.trt_model.clone() => vec![Arc::new(point_source)],
            area_source.trt_model.clone() => vec![Arc::new(area_source)],
        },
        sites,
        realizations,
    }
}
