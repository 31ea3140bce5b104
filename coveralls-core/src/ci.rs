//! CI vendor detection from well-known environment variables.

use crate::config::Environment;

/// Build metadata contributed by the CI service running the job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiMetadata {
    /// Service name Coveralls knows the vendor by.
    pub service_name: Option<String>,
    /// Job identifier.
    pub job_id: Option<String>,
    /// Build number.
    pub number: Option<String>,
    /// Pull request number.
    pub pull_request: Option<String>,
    /// Branch being built.
    pub branch: Option<String>,
}

/// Detect the CI vendor, returning empty metadata outside CI.
pub fn detect_ci(env: &dyn Environment) -> CiMetadata {
    if env.var("GITHUB_ACTIONS").is_some() {
        return github_actions(env);
    }
    if env.var("TRAVIS").is_some() {
        return CiMetadata {
            service_name: Some("travis-ci".to_string()),
            job_id: env.var("TRAVIS_JOB_ID"),
            number: None,
            pull_request: not_false(env.var("TRAVIS_PULL_REQUEST")),
            branch: env.var("TRAVIS_BRANCH"),
        };
    }
    if env.var("CIRCLECI").is_some() {
        return CiMetadata {
            service_name: Some("circle-ci".to_string()),
            job_id: env.var("CIRCLE_BUILD_NUM"),
            number: env.var("CIRCLE_WORKFLOW_ID"),
            pull_request: env
                .var("CI_PULL_REQUEST")
                .and_then(|url| last_segment(&url)),
            branch: env.var("CIRCLE_BRANCH"),
        };
    }
    if env.var("APPVEYOR").is_some() {
        return CiMetadata {
            service_name: Some("appveyor".to_string()),
            job_id: env.var("APPVEYOR_BUILD_ID"),
            number: None,
            pull_request: env.var("APPVEYOR_PULL_REQUEST_NUMBER"),
            branch: env.var("APPVEYOR_REPO_BRANCH"),
        };
    }
    if env.var("BUILDKITE").is_some() {
        return CiMetadata {
            service_name: Some("buildkite".to_string()),
            job_id: env.var("BUILDKITE_JOB_ID"),
            number: env.var("BUILDKITE_BUILD_NUMBER"),
            pull_request: not_false(env.var("BUILDKITE_PULL_REQUEST")),
            branch: env.var("BUILDKITE_BRANCH"),
        };
    }
    if env.var("JENKINS_HOME").is_some() {
        return CiMetadata {
            service_name: Some("jenkins".to_string()),
            job_id: env.var("BUILD_NUMBER"),
            number: None,
            pull_request: env.var("CHANGE_ID"),
            branch: env.var("BRANCH_NAME"),
        };
    }
    if let Some(name) = env.var("CI_NAME") {
        return CiMetadata {
            service_name: Some(name),
            job_id: env.var("CI_JOB_ID"),
            number: env.var("CI_BUILD_NUMBER"),
            pull_request: env.var("CI_PULL_REQUEST"),
            branch: env.var("CI_BRANCH"),
        };
    }
    CiMetadata::default()
}

fn github_actions(env: &dyn Environment) -> CiMetadata {
    let github_ref = env.var("GITHUB_REF");
    let pull_request = github_ref.as_deref().and_then(|value| {
        value
            .strip_prefix("refs/pull/")
            .and_then(|rest| rest.split('/').next())
            .filter(|number| !number.is_empty())
            .map(str::to_string)
    });
    let branch = env.var("GITHUB_HEAD_REF").or_else(|| {
        github_ref
            .as_deref()
            .and_then(|value| value.strip_prefix("refs/heads/"))
            .map(str::to_string)
    });
    CiMetadata {
        service_name: Some("github".to_string()),
        job_id: None,
        number: env.var("GITHUB_RUN_ID"),
        pull_request,
        branch,
    }
}

fn not_false(value: Option<String>) -> Option<String> {
    value.filter(|value| value != "false")
}

fn last_segment(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}
