//! LikeCoordinator: like state for whatever track is playing now.
//!
//! The coordinator does no I/O. It decides which like-service calls to make
//! ([`LikeCall`]) and folds their results back in. The caller runs the calls
//! and hands each result to [`LikeCoordinator::on_response`], in whatever
//! order the network delivers them.
//!
//! # States
//! ```text
//!  NoTrack
//!  Active { track, liked, count }  with phase  Idle | Checking | Toggling
//! ```
//!
//! Every call is stamped with the track generation it was issued for (bumped
//! on each track change) and a per-track sequence number. A result for an
//! older generation is dropped. Within one track, a server answer is dropped
//! only when a newer server answer is already shown, and a failure is dropped
//! when any newer result is already shown. A local fallback never blocks a
//! later server answer.

use std::fmt;

use tracing::{debug, warn};

use elgean_proto::metadata::NowPlaying;
use elgean_proto::protocol::LikeStatus;
use elgean_proto::track::TrackId;

use crate::likes::LikeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// is-liked round trip in flight.
    Checking,
    /// like round trip in flight; the control is disabled.
    Toggling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOp {
    Check,
    Toggle,
}

impl fmt::Display for LikeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LikeOp::Check => "is-liked",
            LikeOp::Toggle => "like",
        })
    }
}

/// A like-service call the coordinator wants made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeCall {
    pub op: LikeOp,
    pub track: TrackId,
    generation: u64,
    seq: u64,
}

/// What happened to a result handed to [`LikeCoordinator::on_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The call belonged to a track that is no longer current.
    Stale,
    /// Same track, but a newer result is already applied.
    Superseded,
}

/// Render-ready like state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LikeView {
    pub track: Option<TrackId>,
    pub liked: bool,
    pub count: u64,
    /// False until the service has answered, and after a local-only flip.
    pub confirmed: bool,
    pub phase: Phase,
    pub control_enabled: bool,
}

#[derive(Debug)]
struct ActiveTrack {
    id: TrackId,
    generation: u64,
    liked: bool,
    count: u64,
    confirmed: bool,
    checking: bool,
    toggling: bool,
    next_seq: u64,
    /// Newest result folded in, server answer or local fallback.
    applied_seq: Option<u64>,
    /// Newest server answer folded in.
    confirmed_seq: Option<u64>,
}

impl ActiveTrack {
    fn phase(&self) -> Phase {
        if self.toggling {
            Phase::Toggling
        } else if self.checking {
            Phase::Checking
        } else {
            Phase::Idle
        }
    }

    fn issue(&mut self, op: LikeOp) -> LikeCall {
        let seq = self.next_seq;
        self.next_seq += 1;
        LikeCall {
            op,
            track: self.id.clone(),
            generation: self.generation,
            seq,
        }
    }
}

#[derive(Debug, Default)]
pub struct LikeCoordinator {
    active: Option<ActiveTrack>,
    generation: u64,
}

impl LikeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_track(&self) -> Option<&TrackId> {
        self.active.as_ref().map(|a| &a.id)
    }

    /// Feed a metadata poll. Returns the is-liked call to make when the
    /// poll reports a different track.
    ///
    /// Metadata without artist or title leaves the coordinator with no
    /// track; the control stays inert until a usable payload arrives.
    pub fn on_metadata(&mut self, now_playing: &NowPlaying) -> Option<LikeCall> {
        self.on_track(now_playing.track_id())
    }

    pub fn on_track(&mut self, track: Option<TrackId>) -> Option<LikeCall> {
        let Some(id) = track else {
            if let Some(old) = self.active.take() {
                debug!("track {} ended without a successor, like control inert", old.id);
                self.generation += 1;
            }
            return None;
        };

        if self.current_track() == Some(&id) {
            return None;
        }

        self.generation += 1;
        debug!("track change → {} (generation {})", id, self.generation);
        let mut active = ActiveTrack {
            id,
            generation: self.generation,
            liked: false,
            count: 0,
            confirmed: false,
            checking: true,
            toggling: false,
            next_seq: 0,
            applied_seq: None,
            confirmed_seq: None,
        };
        let call = active.issue(LikeOp::Check);
        self.active = Some(active);
        Some(call)
    }

    /// User pressed the like control. `None` when there is no track or a
    /// toggle is already in flight, so at most one toggle is ever outstanding.
    pub fn request_toggle(&mut self) -> Option<LikeCall> {
        let active = self.active.as_mut()?;
        if active.toggling {
            debug!("toggle ignored: one already in flight for {}", active.id);
            return None;
        }
        active.toggling = true;
        Some(active.issue(LikeOp::Toggle))
    }

    pub fn on_response(&mut self, call: &LikeCall, result: Result<LikeStatus, LikeError>) -> Outcome {
        let Some(active) = self.active.as_mut() else {
            debug!("dropping {} result for {}: no current track", call.op, call.track);
            return Outcome::Stale;
        };
        if call.generation != active.generation || call.track != active.id {
            debug!(
                "dropping {} result for {}: current track is {}",
                call.op, call.track, active.id
            );
            return Outcome::Stale;
        }

        match call.op {
            LikeOp::Check => active.checking = false,
            LikeOp::Toggle => active.toggling = false,
        }

        let newer = if result.is_ok() {
            active.confirmed_seq
        } else {
            active.applied_seq
        };
        if newer.is_some_and(|seq| call.seq < seq) {
            debug!("dropping {} result for {}: superseded", call.op, call.track);
            return Outcome::Superseded;
        }
        active.applied_seq = active.applied_seq.max(Some(call.seq));

        match (call.op, result) {
            (_, Ok(status)) => {
                active.confirmed_seq = Some(call.seq);
                active.liked = status.liked;
                active.count = status.count;
                active.confirmed = true;
            }
            (LikeOp::Check, Err(e)) => {
                warn!("like status check failed for {}: {}", call.track, e);
                active.liked = false;
                active.count = 0;
                active.confirmed = false;
            }
            (LikeOp::Toggle, Err(e)) => {
                warn!("like toggle failed for {}, showing unconfirmed state: {}", call.track, e);
                active.liked = !active.liked;
                active.confirmed = false;
            }
        }
        Outcome::Applied
    }

    pub fn view(&self) -> LikeView {
        match &self.active {
            None => LikeView::default(),
            Some(a) => LikeView {
                track: Some(a.id.clone()),
                liked: a.liked,
                count: a.count,
                confirmed: a.confirmed,
                phase: a.phase(),
                control_enabled: !a.toggling,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn np(artist: &str, title: &str) -> NowPlaying {
        NowPlaying {
            artist: Some(artist.into()),
            title: Some(title.into()),
            ..NowPlaying::default()
        }
    }

    fn status(liked: bool, count: u64) -> Result<LikeStatus, LikeError> {
        Ok(LikeStatus { liked, count })
    }

    fn network_error() -> Result<LikeStatus, LikeError> {
        Err(LikeError::Rejected("connection reset".into()))
    }

    #[test]
    fn starts_without_track() {
        let mut c = LikeCoordinator::new();
        let view = c.view();
        assert_eq!(view.track, None);
        assert!(!view.control_enabled);
        assert_eq!(c.request_toggle(), None);
    }

    #[test]
    fn track_change_issues_check() {
        let mut c = LikeCoordinator::new();
        let call = c.on_metadata(&np("Sky", "Blue")).unwrap();
        assert_eq!(call.op, LikeOp::Check);
        assert_eq!(call.track.as_str(), "sky|blue");
        assert_eq!(c.view().phase, Phase::Checking);

        // same track in a different case is not a change
        assert_eq!(c.on_metadata(&np("SKY", "blue")), None);
    }

    #[test]
    fn sky_blue_scenario() {
        let mut c = LikeCoordinator::new();
        let check = c.on_metadata(&np("Sky", "Blue")).unwrap();
        assert_eq!(c.on_response(&check, status(false, 3)), Outcome::Applied);

        let view = c.view();
        assert!(!view.liked);
        assert_eq!(view.count, 3);
        assert_eq!(view.phase, Phase::Idle);
        assert!(view.confirmed);
        assert!(view.control_enabled);

        let toggle = c.request_toggle().unwrap();
        assert_eq!(toggle.op, LikeOp::Toggle);
        assert!(!c.view().control_enabled);
        assert_eq!(c.on_response(&toggle, status(true, 4)), Outcome::Applied);

        let view = c.view();
        assert!(view.liked);
        assert_eq!(view.count, 4);
        assert!(view.control_enabled);
    }

    #[test]
    fn failed_check_fails_open() {
        let mut c = LikeCoordinator::new();
        let check = c.on_metadata(&np("Sky", "Blue")).unwrap();
        c.on_response(&check, network_error());

        let view = c.view();
        assert!(!view.liked);
        assert_eq!(view.count, 0);
        assert!(!view.confirmed);
        assert_eq!(view.phase, Phase::Idle);
    }

    #[test]
    fn failed_toggle_flips_locally_and_keeps_count() {
        let mut c = LikeCoordinator::new();
        let check = c.on_metadata(&np("Sky", "Blue")).unwrap();
        c.on_response(&check, status(false, 3));

        let toggle = c.request_toggle().unwrap();
        c.on_response(&toggle, network_error());

        let view = c.view();
        assert!(view.liked);
        assert_eq!(view.count, 3);
        assert!(!view.confirmed);
        assert!(view.control_enabled);

        // the next authoritative answer overwrites the local flip
        let toggle = c.request_toggle().unwrap();
        c.on_response(&toggle, status(true, 4));
        let view = c.view();
        assert!(view.liked && view.confirmed);
        assert_eq!(view.count, 4);
    }

    #[test]
    fn second_toggle_while_in_flight_is_refused() {
        let mut c = LikeCoordinator::new();
        c.on_metadata(&np("Sky", "Blue")).unwrap();
        let first = c.request_toggle();
        assert!(first.is_some());
        assert_eq!(c.request_toggle(), None);
        assert_eq!(c.view().phase, Phase::Toggling);

        c.on_response(&first.unwrap(), status(true, 1));
        assert!(c.request_toggle().is_some());
    }

    #[test]
    fn late_toggle_for_previous_track_is_dropped() {
        let mut c = LikeCoordinator::new();
        let check1 = c.on_metadata(&np("Sky", "Blue")).unwrap();
        c.on_response(&check1, status(false, 3));
        let toggle1 = c.request_toggle().unwrap();

        let check2 = c.on_metadata(&np("Sea", "Green")).unwrap();
        c.on_response(&check2, status(true, 10));

        assert_eq!(c.on_response(&toggle1, status(true, 4)), Outcome::Stale);
        let view = c.view();
        assert_eq!(view.track.unwrap().as_str(), "sea|green");
        assert!(view.liked);
        assert_eq!(view.count, 10);
        assert!(view.control_enabled);
    }

    #[test]
    fn returning_to_an_earlier_track_still_drops_old_results() {
        let mut c = LikeCoordinator::new();
        let old_check = c.on_metadata(&np("Sky", "Blue")).unwrap();
        c.on_metadata(&np("Sea", "Green")).unwrap();
        let new_check = c.on_metadata(&np("Sky", "Blue")).unwrap();

        assert_eq!(c.on_response(&old_check, status(true, 99)), Outcome::Stale);
        assert_eq!(c.on_response(&new_check, status(false, 3)), Outcome::Applied);
        assert_eq!(c.view().count, 3);
    }

    #[test]
    fn check_arriving_after_toggle_is_superseded() {
        let mut c = LikeCoordinator::new();
        let check = c.on_metadata(&np("Sky", "Blue")).unwrap();
        let toggle = c.request_toggle().unwrap();

        c.on_response(&toggle, status(true, 4));
        assert_eq!(c.on_response(&check, status(false, 3)), Outcome::Superseded);

        let view = c.view();
        assert!(view.liked);
        assert_eq!(view.count, 4);
        assert_eq!(view.phase, Phase::Idle);
    }

    #[test]
    fn check_answer_replaces_flip_from_earlier_failed_toggle() {
        let mut c = LikeCoordinator::new();
        let check = c.on_metadata(&np("Sky", "Blue")).unwrap();
        let toggle = c.request_toggle().unwrap();

        assert_eq!(c.on_response(&toggle, network_error()), Outcome::Applied);
        let view = c.view();
        assert!(view.liked && !view.confirmed);

        assert_eq!(c.on_response(&check, status(false, 3)), Outcome::Applied);
        let view = c.view();
        assert!(!view.liked);
        assert_eq!(view.count, 3);
        assert!(view.confirmed);
        assert_eq!(view.phase, Phase::Idle);
        assert!(view.control_enabled);
    }

    #[test]
    fn failed_check_after_confirmed_toggle_is_superseded() {
        let mut c = LikeCoordinator::new();
        let check = c.on_metadata(&np("Sky", "Blue")).unwrap();
        let toggle = c.request_toggle().unwrap();

        c.on_response(&toggle, status(true, 4));
        assert_eq!(c.on_response(&check, network_error()), Outcome::Superseded);

        let view = c.view();
        assert!(view.liked && view.confirmed);
        assert_eq!(view.count, 4);
        assert_eq!(view.phase, Phase::Idle);
    }

    #[test]
    fn failed_check_after_failed_toggle_keeps_the_flip() {
        let mut c = LikeCoordinator::new();
        let check = c.on_metadata(&np("Sky", "Blue")).unwrap();
        let toggle = c.request_toggle().unwrap();

        c.on_response(&toggle, network_error());
        assert_eq!(c.on_response(&check, network_error()), Outcome::Superseded);

        let view = c.view();
        assert!(view.liked && !view.confirmed);
        assert_eq!(view.phase, Phase::Idle);
    }

    #[test]
    fn failed_toggle_after_confirmed_check_flips_from_server_state() {
        let mut c = LikeCoordinator::new();
        let check = c.on_metadata(&np("Sky", "Blue")).unwrap();
        let toggle = c.request_toggle().unwrap();

        // check answers first, then the toggle fails
        assert_eq!(c.on_response(&check, status(true, 7)), Outcome::Applied);
        assert_eq!(c.on_response(&toggle, network_error()), Outcome::Applied);

        let view = c.view();
        assert!(!view.liked && !view.confirmed);
        assert_eq!(view.count, 7);
    }

    #[test]
    fn metadata_without_title_clears_track() {
        let mut c = LikeCoordinator::new();
        let check = c.on_metadata(&np("Sky", "Blue")).unwrap();

        let blank = NowPlaying {
            artist: Some("Sky".into()),
            ..NowPlaying::default()
        };
        assert_eq!(c.on_metadata(&blank), None);
        assert_eq!(c.view(), LikeView::default());
        assert_eq!(c.on_response(&check, status(true, 1)), Outcome::Stale);

        // same track coming back is a fresh track change
        assert!(c.on_metadata(&np("Sky", "Blue")).is_some());
    }
}
