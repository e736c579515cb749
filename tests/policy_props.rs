//! Property tests for the organization policy and the sanitizers.

use chrono::{Local, TimeZone};
use proptest::prelude::*;
use recorder::session::{CaptureSession, MediaKind, SessionId};
use recorder::title::{sanitize_title, SourceId, TitleResolution};
use recorder::utils::organizer::{
    compute_destination, sanitize_component, OrganizationPolicy, OrganizeMode, Placement,
    MAX_COMPONENT_LEN,
};
use std::path::PathBuf;
use std::time::Duration;

fn media_kind() -> impl Strategy<Value = MediaKind> {
    prop_oneof![
        Just(MediaKind::Recording),
        Just(MediaKind::ReplayBuffer),
        Just(MediaKind::Screenshot),
    ]
}

fn policy() -> impl Strategy<Value = OrganizationPolicy> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), "[ -~]{0,24}").prop_map(
        |(by_date, replay, screenshots, prefix, fallback)| OrganizationPolicy {
            mode: if by_date {
                OrganizeMode::GroupByDate
            } else {
                OrganizeMode::Basic
            },
            fallback_folder_name: fallback,
            organize_replay_buffer: replay,
            organize_screenshots: screenshots,
            prefix_filename_with_title: prefix,
            capture_root: Some(PathBuf::from("/captures")),
            ..Default::default()
        },
    )
}

fn session(title: Option<String>, kind: MediaKind, start_secs: i64) -> CaptureSession {
    let started_at = Local
        .timestamp_opt(start_secs, 0)
        .single()
        .unwrap_or_else(Local::now);
    let resolution = title
        .map(|t| sanitize_title(&t))
        .filter(|t| !t.is_empty())
        .map(TitleResolution::Resolved)
        .unwrap_or(TitleResolution::Unresolved);
    CaptureSession::new(SessionId::from(1u64), SourceId::Any, kind, started_at).with_title(resolution)
}

proptest! {
    #[test]
    fn compute_destination_is_idempotent(
        title in proptest::option::of("[a-zA-Z0-9 :!]{0,40}"),
        kind in media_kind(),
        start in 0i64..4_000_000_000,
        file in "[a-zA-Z0-9_]{1,20}\\.(mp4|mkv|png)",
        policy in policy(),
    ) {
        let session = session(title, kind, start);
        let path = PathBuf::from("/out").join(&file);

        let first = compute_destination(&session, &path, &policy);
        let second = compute_destination(&session, &path, &policy);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn every_split_shares_one_folder(
        title in proptest::option::of("[a-zA-Z0-9 ]{0,40}"),
        start in 0i64..4_000_000_000,
        files in proptest::collection::vec("[a-z0-9]{1,12}\\.mp4", 1..12),
        gaps in proptest::collection::vec(0u64..200_000, 1..12),
        policy in policy(),
    ) {
        let mut session = session(title, MediaKind::Recording, start);
        let mut folders = Vec::new();

        for (file, gap) in files.iter().zip(gaps.iter().cycle()) {
            // Splits arrive later and later, possibly days after the start
            session.last_activity += Duration::from_secs(*gap);
            let path = PathBuf::from("/out").join(file);
            session.split_sequence.push(path.clone());

            match compute_destination(&session, &path, &policy) {
                Placement::File(request) => {
                    prop_assert!(request.destination_filename.ends_with(file.as_str()));
                    folders.push(request.destination_folder);
                }
                Placement::LeaveInPlace { .. } => prop_assert!(false, "recordings are always filed"),
            }
        }

        folders.dedup();
        prop_assert_eq!(folders.len(), 1);
    }

    #[test]
    fn gated_kinds_are_left_in_place(
        kind in media_kind(),
        policy in policy(),
    ) {
        let session = session(Some("Game A".into()), kind, 1_714_550_400);
        let path = PathBuf::from("/out/file.bin");
        let gated = match kind {
            MediaKind::Recording => false,
            MediaKind::ReplayBuffer => !policy.organize_replay_buffer,
            MediaKind::Screenshot => !policy.organize_screenshots,
        };

        let placement = compute_destination(&session, &path, &policy);
        prop_assert_eq!(matches!(placement, Placement::LeaveInPlace { .. }), gated);
    }

    #[test]
    fn sanitized_components_are_safe(name in "\\PC{0,300}") {
        let clean = sanitize_component(&name);
        prop_assert!(!clean.contains('/'));
        prop_assert!(!clean.contains('\\'));
        prop_assert!(!clean.contains(".."));
        prop_assert!(!clean.starts_with('.'));
        prop_assert!(clean.chars().count() <= MAX_COMPONENT_LEN);
    }

    #[test]
    fn sanitized_titles_are_plain(title in "\\PC{0,300}") {
        let clean = sanitize_title(&title);
        prop_assert!(clean.chars().all(|c| c.is_alphanumeric() || c == ' '));
        prop_assert!(!clean.starts_with(' ') && !clean.ends_with(' '));
        prop_assert!(!clean.contains("  "));
        prop_assert!(clean.chars().count() <= 100);
    }
}
