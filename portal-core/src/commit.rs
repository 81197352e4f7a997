/// Staged Wi-Fi credential commit protocol.
///
/// A credential change is never trusted until the device has joined the
/// proposed network once. The three-state machine below is persisted
/// inside the device record so the outcome survives a reboot or power
/// loss at any point:
///
/// - `Stable` — current credentials are assumed good.
/// - `TestingNew` — a change was staged; the old pair is held for
///   rollback. A boot in this state means the join was never confirmed.
/// - `RollingBack` — the old pair has been restored; the next boot
///   validates it and settles to `Stable` whether or not it still works,
///   so a dead network degrades to access-point mode instead of a
///   restart loop.
use crate::record::{DeviceRecord, RecordError, WifiCommitState};

/// What the boot sequence must do for the current persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPlan {
    /// No credentials configured; skip STA entirely.
    StartAccessPoint,
    /// Steady state: join the current network, fall back to the access
    /// point on failure without persisting anything.
    JoinCurrent,
    /// A staged change was never confirmed: restore the old pair, mark
    /// `RollingBack`, persist, restart once.
    RollBack,
    /// Rollback already happened: join the restored pair and settle to
    /// `Stable` either way (access point if the join still fails).
    ValidateRestored,
}

pub fn boot_plan(record: &DeviceRecord) -> BootPlan {
    match record.wifi_state {
        WifiCommitState::Stable => {
            if record.has_wifi_credentials() {
                BootPlan::JoinCurrent
            } else {
                BootPlan::StartAccessPoint
            }
        }
        WifiCommitState::TestingNew => BootPlan::RollBack,
        WifiCommitState::RollingBack => BootPlan::ValidateRestored,
    }
}

/// Stage a proposed credential pair: back up the current pair and mark
/// the record `TestingNew`. The caller persists the record before the
/// live join test so a mid-test power loss still triggers rollback.
pub fn stage(record: &mut DeviceRecord, ssid: &str, password: &str) -> Result<(), RecordError> {
    DeviceRecord::check_credentials(ssid, password)?;
    record.old_wifi_ssid = record.wifi_ssid.clone();
    record.old_wifi_password = record.wifi_password.clone();
    record.wifi_ssid = ssid.to_string();
    record.wifi_password = password.to_string();
    record.wifi_state = WifiCommitState::TestingNew;
    Ok(())
}

/// The staged credentials joined successfully: make them the new
/// last-known-good pair.
pub fn commit(record: &mut DeviceRecord) {
    record.wifi_state = WifiCommitState::Stable;
}

/// Clear the configured network. There is nothing to test (an empty
/// SSID means access-point mode), so this commits directly instead of
/// staging: a staged empty pair could never pass a join test and the
/// credentials would be impossible to remove.
pub fn clear(record: &mut DeviceRecord) {
    record.old_wifi_ssid = record.wifi_ssid.clone();
    record.old_wifi_password = record.wifi_password.clone();
    record.wifi_ssid = String::new();
    record.wifi_password = String::new();
    record.wifi_state = WifiCommitState::Stable;
}

/// Restore the last-known-good pair after an unconfirmed change. The
/// staged pair is discarded; `RollingBack` marks that one validation
/// boot remains.
pub fn roll_back(record: &mut DeviceRecord) {
    record.wifi_ssid = record.old_wifi_ssid.clone();
    record.wifi_password = record.old_wifi_password.clone();
    record.wifi_state = WifiCommitState::RollingBack;
}

/// Close out a rollback: the record returns to `Stable` regardless of
/// whether the restored pair joined, ending the restart sequence.
pub fn settle(record: &mut DeviceRecord) {
    record.wifi_state = WifiCommitState::Stable;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_network(ssid: &str, password: &str) -> DeviceRecord {
        let mut record = DeviceRecord::defaults("A1B2C3D4E5F6");
        record.wifi_ssid = ssid.to_string();
        record.wifi_password = password.to_string();
        record
    }

    #[test]
    fn boot_plan_for_each_state() {
        let mut record = DeviceRecord::defaults("AA");
        assert_eq!(boot_plan(&record), BootPlan::StartAccessPoint);

        record.wifi_ssid = "Home".to_string();
        assert_eq!(boot_plan(&record), BootPlan::JoinCurrent);

        record.wifi_state = WifiCommitState::TestingNew;
        assert_eq!(boot_plan(&record), BootPlan::RollBack);

        record.wifi_state = WifiCommitState::RollingBack;
        assert_eq!(boot_plan(&record), BootPlan::ValidateRestored);
    }

    #[test]
    fn stage_backs_up_current_pair() {
        let mut record = record_with_network("Home", "secret");
        stage(&mut record, "Foo", "").unwrap();
        assert_eq!(record.wifi_state, WifiCommitState::TestingNew);
        assert_eq!(record.wifi_ssid, "Foo");
        assert_eq!(record.wifi_password, "");
        assert_eq!(record.old_wifi_ssid, "Home");
        assert_eq!(record.old_wifi_password, "secret");
    }

    #[test]
    fn stage_rejects_oversized_credentials() {
        let mut record = record_with_network("Home", "secret");
        assert!(stage(&mut record, &"s".repeat(33), "").is_err());
        // A rejected proposal must not touch the record.
        assert_eq!(record.wifi_ssid, "Home");
        assert_eq!(record.wifi_state, WifiCommitState::Stable);
    }

    #[test]
    fn successful_test_commits_to_stable() {
        let mut record = record_with_network("Home", "secret");
        stage(&mut record, "Foo", "pass").unwrap();
        commit(&mut record);
        assert_eq!(record.wifi_state, WifiCommitState::Stable);
        assert_eq!(record.wifi_ssid, "Foo");
        // Old pair stays around as the rollback target of the next change.
        assert_eq!(record.old_wifi_ssid, "Home");
    }

    #[test]
    fn failed_join_walks_to_access_point_without_looping() {
        // Propose a network that never joins: TestingNew survives the
        // restart, the next boot rolls back, the one after settles.
        let mut record = record_with_network("Home", "secret");
        stage(&mut record, "Foo", "").unwrap();

        // Boot 1: unconfirmed change.
        assert_eq!(boot_plan(&record), BootPlan::RollBack);
        roll_back(&mut record);
        assert_eq!(record.wifi_ssid, "Home");
        assert_eq!(record.wifi_password, "secret");
        assert_eq!(record.wifi_state, WifiCommitState::RollingBack);

        // Boot 2: validate the restored pair; it fails too.
        assert_eq!(boot_plan(&record), BootPlan::ValidateRestored);
        settle(&mut record);
        assert_eq!(record.wifi_state, WifiCommitState::Stable);

        // Boot 3 would be an ordinary stable boot, not another rollback.
        assert_eq!(boot_plan(&record), BootPlan::JoinCurrent);
    }

    #[test]
    fn old_pair_always_equals_last_stable_pair() {
        let mut record = record_with_network("Home", "secret");

        // Two failing proposals in a row; the rollback target must stay
        // the last credentials that were ever Stable, never a staged pair.
        stage(&mut record, "Bad1", "x").unwrap();
        roll_back(&mut record);
        settle(&mut record);
        assert_eq!(record.old_wifi_ssid, "Home");

        stage(&mut record, "Bad2", "y").unwrap();
        assert_eq!(record.old_wifi_ssid, "Home");
        roll_back(&mut record);
        settle(&mut record);
        assert_eq!(record.wifi_ssid, "Home");
        assert_eq!(record.wifi_password, "secret");
    }

    #[test]
    fn clearing_credentials_survives_the_next_boot() {
        // An empty SSID is committed directly; staging it would fail
        // the join test and the next boot would restore the old pair,
        // making the network impossible to remove.
        let mut record = record_with_network("Home", "secret");
        clear(&mut record);
        assert_eq!(record.wifi_state, WifiCommitState::Stable);
        assert_eq!(record.wifi_ssid, "");
        assert_eq!(record.old_wifi_ssid, "Home");
        assert_eq!(boot_plan(&record), BootPlan::StartAccessPoint);
    }

    #[test]
    fn staged_records_always_carry_a_rollback_target() {
        let mut record = DeviceRecord::defaults("AA");
        // Empty current pair is a valid rollback target (AP fallback).
        stage(&mut record, "First", "pw").unwrap();
        assert_eq!(record.old_wifi_ssid, "");
        roll_back(&mut record);
        settle(&mut record);
        assert_eq!(boot_plan(&record), BootPlan::StartAccessPoint);
    }
}
