use std::fs;

use letsencrypt_webfaction::PipelineError;
use letsencrypt_webfaction::core::error::EXIT_AUTHENTICATION;
use letsencrypt_webfaction::core::types::AuthorizationStatus::{Invalid, Pending, Valid};
use letsencrypt_webfaction::hosting::installer::InstallAction;
use letsencrypt_webfaction::issuance::challenge::WebrootPublisher;
use letsencrypt_webfaction::issuance::flow::{PipelineOutcome, run_pipeline};
use letsencrypt_webfaction::issuance::validator::DomainStatus;

use super::support::{FakeAuthority, MemoryHosting, NoopSleeper, RecordingPublisher, config};

#[test]
fn single_domain_valid_on_first_poll_is_installed() {
    let config = config("example.com", &[]);
    let mut authority = FakeAuthority::default().with_script("example.com", &[Valid]);
    let mut hosting = MemoryHosting::default();
    let publisher = RecordingPublisher::default();

    let outcome = run_pipeline(&config, &mut authority, &mut hosting, &publisher, &NoopSleeper)
        .expect("pipeline succeeds");

    let PipelineOutcome::Installed(report) = outcome else {
        panic!("expected installation");
    };
    assert_eq!(report.cert_name, "site");
    assert_eq!(report.action, InstallAction::Created);
    assert_eq!(authority.polls["example.com"], 1);
    assert_eq!(authority.count("issue"), 1);

    let (certificate, private_key, intermediates) = &hosting.certificates["site"];
    assert!(certificate.contains("BEGIN CERTIFICATE"));
    assert!(private_key.contains("PRIVATE KEY"));
    assert!(intermediates.contains("BEGIN CERTIFICATE"));
    let summary = report.summary.expect("summary");
    assert_eq!(summary.sans, vec!["example.com"]);
}

#[test]
fn timed_out_domain_blocks_issuance_and_installation() {
    let config = config("a.example.com,b.example.com", &[]);
    let mut authority = FakeAuthority::default()
        .with_script("a.example.com", &[Valid])
        .with_script("b.example.com", &[Pending]);
    let mut hosting = MemoryHosting::default();
    let publisher = RecordingPublisher::default();

    let outcome = run_pipeline(&config, &mut authority, &mut hosting, &publisher, &NoopSleeper)
        .expect("validation failure is not an error");

    let PipelineOutcome::ValidationFailed(report) = outcome else {
        panic!("expected validation failure");
    };
    assert!(!report.is_valid());
    assert_eq!(report.outcomes[0].status, DomainStatus::Valid);
    assert_eq!(
        report.outcomes[1].status,
        DomainStatus::TimedOut { attempts: 3 }
    );
    assert_eq!(authority.count("issue"), 0);
    assert!(hosting.certificates.is_empty());
    assert!(!hosting.calls.contains(&"list_certificates"));
}

#[test]
fn every_domain_is_polled_after_an_early_failure() {
    let config = config("a.example.com,b.example.com,c.example.com", &[]);
    let mut authority = FakeAuthority::default()
        .with_script("a.example.com", &[Invalid])
        .with_script("b.example.com", &[Pending, Valid])
        .with_script("c.example.com", &[Valid]);
    let mut hosting = MemoryHosting::default();
    let publisher = RecordingPublisher::default();

    let outcome = run_pipeline(&config, &mut authority, &mut hosting, &publisher, &NoopSleeper)
        .expect("pipeline runs");

    assert!(matches!(outcome, PipelineOutcome::ValidationFailed(_)));
    assert_eq!(authority.count("request_verification"), 3);
    assert_eq!(authority.polls.len(), 3);
    assert_eq!(
        *publisher.published.borrow(),
        vec!["a.example.com", "b.example.com", "c.example.com"]
    );
    assert_eq!(authority.count("issue"), 0);
}

#[test]
fn rejected_hosting_login_stops_before_the_authority() {
    let config = config("example.com", &[]);
    let mut authority = FakeAuthority::default().with_script("example.com", &[Valid]);
    let mut hosting = MemoryHosting {
        reject_login: true,
        ..MemoryHosting::default()
    };
    let publisher = RecordingPublisher::default();

    let err = run_pipeline(&config, &mut authority, &mut hosting, &publisher, &NoopSleeper)
        .expect_err("login must fail");

    assert!(matches!(err, PipelineError::Authentication(_)));
    assert_eq!(err.exit_code(), EXIT_AUTHENTICATION);
    assert!(authority.calls.is_empty());
    assert!(publisher.published.borrow().is_empty());
}

#[test]
fn rerunning_with_the_same_name_updates_in_place() {
    let config = config("example.com", &[]);
    let mut hosting = MemoryHosting::default();
    let publisher = RecordingPublisher::default();

    for expected in [InstallAction::Created, InstallAction::Updated] {
        let mut authority = FakeAuthority {
            existing_account: expected == InstallAction::Updated,
            ..FakeAuthority::default()
        }
        .with_script("example.com", &[Valid]);
        let outcome =
            run_pipeline(&config, &mut authority, &mut hosting, &publisher, &NoopSleeper)
                .expect("pipeline succeeds");
        let PipelineOutcome::Installed(report) = outcome else {
            panic!("expected installation");
        };
        assert_eq!(report.action, expected);
        assert_eq!(authority.count("register"), 1);
        assert_eq!(authority.count("agree_terms"), 1);
    }

    assert_eq!(hosting.certificates.len(), 1);
    assert_eq!(
        hosting
            .calls
            .iter()
            .filter(|call| **call == "create_certificate")
            .count(),
        1
    );
}

#[test]
fn issuance_rejection_is_fatal_and_skips_installation() {
    let config = config("example.com", &[]);
    let mut authority = FakeAuthority {
        reject_issue: true,
        ..FakeAuthority::default()
    }
    .with_script("example.com", &[Valid]);
    let mut hosting = MemoryHosting::default();
    let publisher = RecordingPublisher::default();

    let err = run_pipeline(&config, &mut authority, &mut hosting, &publisher, &NoopSleeper)
        .expect_err("issuance fails");

    assert!(matches!(err, PipelineError::Issuance(msg) if msg.contains("badCSR")));
    assert_eq!(authority.count("issue"), 1);
    assert!(hosting.certificates.is_empty());
}

#[test]
fn webroot_proofs_are_written_and_removed() {
    let webroot = tempfile::tempdir().expect("webroot");
    let config = config("example.com", &[]);
    let mut authority = FakeAuthority::default().with_script("example.com", &[Valid]);
    let mut hosting = MemoryHosting::default();
    let publisher = WebrootPublisher::new(vec![webroot.path().to_path_buf()]);

    run_pipeline(&config, &mut authority, &mut hosting, &publisher, &NoopSleeper)
        .expect("pipeline succeeds");

    let challenge_dir = webroot.path().join(".well-known/acme-challenge");
    assert!(challenge_dir.is_dir());
    assert_eq!(fs::read_dir(&challenge_dir).expect("read dir").count(), 0);
}

#[test]
fn export_dir_receives_the_bundle() {
    let export = tempfile::tempdir().expect("export dir");
    let export_arg = export.path().to_str().expect("utf-8 path").to_string();
    let config = config("example.com,www.example.com", &["--export-dir", export_arg.as_str()]);
    let mut authority = FakeAuthority::default()
        .with_script("example.com", &[Valid])
        .with_script("www.example.com", &[Valid]);
    let mut hosting = MemoryHosting::default();
    let publisher = RecordingPublisher::default();

    let outcome = run_pipeline(&config, &mut authority, &mut hosting, &publisher, &NoopSleeper)
        .expect("pipeline succeeds");

    let PipelineOutcome::Installed(report) = outcome else {
        panic!("expected installation");
    };
    let labels: Vec<&str> = report.exported.iter().map(|file| file.label).collect();
    assert_eq!(labels, vec!["cert", "chain", "fullchain", "privkey"]);
    for name in ["cert.pem", "chain.pem", "fullchain.pem", "privkey.pem"] {
        assert!(export.path().join("site").join(name).is_file(), "{name}");
    }
    assert_eq!(hosting.certificates.len(), 1);
}
