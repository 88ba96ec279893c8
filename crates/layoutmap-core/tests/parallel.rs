//! Batch resolution across versions.

mod common;

use layoutmap_core::debuginfo::DebugInfo;
use layoutmap_core::driver::{self, ResolveJob};
use layoutmap_core::{LayoutError, RuntimeFamily};

fn builds() -> Vec<(RuntimeFamily, &'static str, DebugInfo)>
{
    let mut builds: Vec<_> = common::PYTHON_VERSIONS
        .into_iter()
        .map(|version| (RuntimeFamily::Python, version, common::python(version)))
        .collect();
    builds.push((RuntimeFamily::Ruby, "2.6.10", common::ruby_2_6_10()));
    builds.push((RuntimeFamily::Ruby, "3.3.0", common::ruby_3_3_0()));
    builds
}

#[test]
fn test_batch_matches_sequential()
{
    let builds = builds();
    let jobs: Vec<ResolveJob<'_>> = builds
        .iter()
        .map(|(family, version, info)| ResolveJob::new(*family, version, info))
        .collect();

    let batch = driver::resolve_versions(&jobs);
    assert_eq!(batch.len(), builds.len());

    for ((family, version, info), parallel) in builds.iter().zip(batch) {
        let sequential = driver::resolve_version(*family, version, info).unwrap();
        let parallel = parallel.unwrap();
        assert_eq!(parallel.version(), *version);
        assert_eq!(parallel, sequential);
        assert_eq!(
            parallel.to_canonical_json().unwrap(),
            sequential.to_canonical_json().unwrap()
        );
    }
}

#[test]
fn test_repeated_batches_are_identical()
{
    let builds = builds();
    let jobs: Vec<ResolveJob<'_>> = builds
        .iter()
        .map(|(family, version, info)| ResolveJob::new(*family, version, info))
        .collect();

    let render = |jobs: &[ResolveJob<'_>]| -> Vec<String> {
        driver::resolve_versions(jobs)
            .into_iter()
            .map(|layout| layout.unwrap().to_canonical_json().unwrap())
            .collect()
    };
    let first = render(&jobs);
    for _ in 0..4 {
        assert_eq!(render(&jobs), first);
    }
}

#[test]
fn test_one_failing_job_does_not_affect_others()
{
    let python = common::python_3_9_5();
    let ruby = common::ruby_3_3_0();
    let jobs = [
        ResolveJob::new(RuntimeFamily::Python, "3.9.5", &python),
        // Python types carry none of the Ruby structs.
        ResolveJob::new(RuntimeFamily::Ruby, "3.3.0", &python),
        ResolveJob::new(RuntimeFamily::Ruby, "3.3.0", &ruby),
    ];

    let results = driver::resolve_versions(&jobs);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(LayoutError::TypeNotFound { .. })));
    assert_eq!(results[2].as_ref().unwrap().family(), RuntimeFamily::Ruby);
}
