use std::time::Duration;

use approx::assert_abs_diff_eq;
use chrono::{FixedOffset, TimeZone, Utc};
use tokio::io::DuplexStream;

use synscan::clock::{Clock, FixedClock};
use synscan::config::MountConfig;
use synscan::mock::{MockMount, MountReplies};
use synscan::transform::{lst_hours, range24};
use synscan::transport::ChannelError;
use synscan::{
    Axis, Direction, Hemisphere, MountController, MountError, MountStatus, MountTime, Observer,
    RaDec, TrackingMode, DEFAULT_JOG_SPEED,
};

fn clock() -> FixedClock {
    let instant = Utc.with_ymd_and_hms(2025, 3, 1, 14, 30, 5).unwrap();
    FixedClock::new(instant).with_offset(FixedOffset::east_opt(8 * 3600).unwrap())
}

fn config() -> MountConfig {
    MountConfig {
        timeout_ms: 200,
        settle_ms: 0,
        ..MountConfig::default()
    }
}

/// A connected controller talking to `replies`, with the handshake frames cleared.
async fn connected(replies: MountReplies) -> (MountController<DuplexStream>, MockMount) {
    let (link, mount) = MockMount::with_replies(replies);
    let mut controller = MountController::new(config()).with_clock(clock());
    controller.attach("mock", link).await.unwrap();
    mount.clear_frames();
    (controller, mount)
}

#[tokio::test]
async fn connect_handshake_order() {
    let (link, mount) = MockMount::with_replies(MountReplies::default());
    let mut controller = MountController::new(config()).with_clock(clock());
    controller
        .set_observer(Observer {
            latitude: 40.0,
            longitude: -75.5,
            elevation: 12,
        })
        .unwrap();

    controller.attach("mock", link).await.unwrap();

    assert_eq!(
        mount.frames(),
        vec![
            ":T120250301223005+08",
            ":Z1+40.0000,-75.5000,+012",
            ":F1",
            ":F2",
            ":j1",
            ":j2",
            ":a1",
        ]
    );
    assert_eq!(controller.status(), MountStatus::Ready);
    assert_eq!(controller.state().steps_per_rev(), 5_120_000);
    assert!(controller.is_connected());
}

#[tokio::test]
async fn connect_sends_default_site() {
    let (link, mount) = MockMount::with_replies(MountReplies::default());
    let mut controller = MountController::new(config()).with_clock(clock());
    controller.attach("mock", link).await.unwrap();

    assert_eq!(mount.frames()[1], ":Z1+39.9164,+116.3830,+000");
    assert!(controller.state().observer().is_none());
}

#[tokio::test]
async fn connect_replaces_out_of_range_site_with_default() {
    let (link, mount) = MockMount::with_replies(MountReplies::default());
    let config = MountConfig {
        latitude: Some(123.0),
        longitude: Some(400.0),
        elevation: 99_999,
        ..config()
    };
    let mut controller = MountController::new(config).with_clock(clock());

    controller.attach("mock", link).await.unwrap();

    assert_eq!(mount.frames()[1], ":Z1+39.9164,+116.3830,+000");
    assert!(controller.state().observer().is_none());
    assert_eq!(controller.state().hemisphere(), Hemisphere::North);
}

#[tokio::test]
async fn connect_keeps_known_steps_per_rev() {
    // standard constant misreported by the firmware, an unknown value, garbage
    for payload in ["00000001", "000010", "zz"] {
        let replies = MountReplies::default().steps_per_rev(payload);
        let (controller, _mount) = connected(replies).await;
        assert_eq!(controller.state().steps_per_rev(), 5_120_000, "{payload}");
        assert_eq!(controller.status(), MountStatus::Ready);
    }
}

#[tokio::test]
async fn connect_survives_rejected_handshake_steps() {
    let replies = MountReplies::default().reject(":T1").reject(":F");
    let (link, mount) = MockMount::with_replies(replies);
    let mut controller = MountController::new(config()).with_clock(clock());

    controller.attach("mock", link).await.unwrap();

    assert_eq!(controller.status(), MountStatus::Ready);
    // axis init aborts after RA, the steps query still runs
    assert_eq!(
        mount.frames(),
        vec![
            ":T120250301223005+08",
            ":Z1+39.9164,+116.3830,+000",
            ":F1",
            ":a1",
        ]
    );
    let last = controller.diagnostics().last().unwrap();
    assert!(last.starts_with("initialize RA axis"), "{last}");
}

#[tokio::test]
async fn connect_captures_legacy_zero_offsets() {
    let replies = MountReplies::default().positions("A08601", "00204E");
    let (controller, _mount) = connected(replies).await;

    assert_eq!(controller.state().zero_offset(Axis::RightAscension), 100_000);
    assert_eq!(controller.state().zero_offset(Axis::Declination), 5_120_000);
}

#[tokio::test]
async fn position_from_decimal_firmware() {
    let replies = MountReplies::default().positions("123.456", "-45.5");
    let (mut controller, mount) = connected(replies).await;

    let position = controller.get_ra_dec().await.unwrap();
    assert_eq!(position, RaDec::new(123.456, -45.5));
    assert_eq!(controller.state().last_position(), Some(position));
    assert_eq!(mount.frames(), vec![":j1", ":j2"]);
}

#[tokio::test]
async fn decimal_positions_are_normalized() {
    let replies = MountReplies::default().positions("-10.0", "95.0");
    let (mut controller, _mount) = connected(replies).await;

    let position = controller.get_ra_dec().await.unwrap();
    assert_abs_diff_eq!(position.ra, 350.0, epsilon = 1e-9);
    assert_abs_diff_eq!(position.dec, 90.0, epsilon = 1e-9);
}

#[tokio::test]
async fn position_from_legacy_encoders() {
    // encoders still at their zero offsets
    let replies = MountReplies::default().positions("A08601", "00204E");
    let (mut controller, mount) = connected(replies).await;

    let position = controller.get_ra_dec().await.unwrap();

    // four reads: the decimal attempt, then the encoder fallback
    assert_eq!(mount.frames(), vec![":j1", ":j2", ":j1", ":j2"]);
    // at zero the hour angle is the 6 h mount offset and DEC sits on the equator
    let lst = lst_hours(clock().now_utc(), 116.3830);
    assert_abs_diff_eq!(position.ra, range24(lst - 6.0) * 15.0, epsilon = 1e-6);
    assert_abs_diff_eq!(position.dec, 0.0, epsilon = 1e-9);
}

#[tokio::test]
async fn position_from_mixed_firmware_replies() {
    // RA answers in degrees, DEC in encoder steps; zero offsets stay at 0
    let replies = MountReplies::default().positions("90.0", "00204E");
    let (mut controller, mount) = connected(replies).await;

    let position = controller.get_ra_dec().await.unwrap();

    assert_eq!(mount.frames(), vec![":j1", ":j2", ":j1", ":j2"]);
    // 90° of RA is a quarter turn of steps, cancelling the 6 h mount offset;
    // a full DEC turn lands back on the equator
    let lst = lst_hours(clock().now_utc(), 116.3830);
    assert_abs_diff_eq!(position.ra, range24(lst) * 15.0, epsilon = 1e-6);
    assert_abs_diff_eq!(position.dec, 0.0, epsilon = 1e-9);
    assert_eq!(controller.state().last_position(), Some(position));
}

#[tokio::test]
async fn axis_steps_from_either_reply_format() {
    let replies = MountReplies::default().positions("90.0", "A08601");
    let (mut controller, _mount) = connected(replies).await;

    assert_eq!(controller.get_axis_steps(Axis::RightAscension).await.unwrap(), 1_280_000);
    assert_eq!(controller.get_axis_steps(Axis::Declination).await.unwrap(), 100_000);
}

#[tokio::test]
async fn axis_degrees_are_normalized() {
    let replies = MountReplies::default().positions("-30.0", "95.0");
    let (mut controller, mount) = connected(replies).await;

    let ra = controller.get_axis_degrees(Axis::RightAscension).await.unwrap();
    let dec = controller.get_axis_degrees(Axis::Declination).await.unwrap();

    assert_abs_diff_eq!(ra, 330.0, epsilon = 1e-9);
    assert_abs_diff_eq!(dec, 90.0, epsilon = 1e-9);
    assert_eq!(mount.frames(), vec![":j1", ":j2"]);
}

#[tokio::test]
async fn axis_degrees_reject_encoder_replies() {
    let replies = MountReplies::default().positions("A08601", "00204E");
    let (mut controller, _mount) = connected(replies).await;

    let err = controller
        .get_axis_degrees(Axis::RightAscension)
        .await
        .unwrap_err();

    assert!(matches!(err, MountError::Codec { .. }), "{err:?}");
    let last = controller.diagnostics().last().unwrap();
    assert!(last.starts_with("read RA degrees"), "{last}");
}

#[tokio::test]
async fn position_read_fails_when_not_connected() {
    let mut controller: MountController<DuplexStream> = MountController::new(config());

    let err = controller.get_ra_dec().await.unwrap_err();
    assert!(matches!(
        err,
        MountError::Channel {
            source: ChannelError::LinkNotOpen,
            ..
        }
    ));
    assert!(controller.state().last_position().is_none());
    assert!(controller.diagnostics().last().is_some());
}

#[tokio::test]
async fn goto_rejects_out_of_range_without_sending() {
    let (mut controller, mount) = connected(MountReplies::default()).await;

    for (ra, dec) in [(0.0, 91.0), (0.0, -90.1), (3600.1, 0.0), (-3601.0, 0.0)] {
        let err = controller.goto_ra_dec(ra, dec).await.unwrap_err();
        assert!(matches!(err, MountError::InvalidCoordinates { .. }));
        let err = controller.slew_to_coordinates(ra, dec).await.unwrap_err();
        assert!(matches!(err, MountError::InvalidCoordinates { .. }));
    }
    assert!(mount.frames().is_empty());
    assert_eq!(controller.status(), MountStatus::Ready);
}

#[tokio::test]
async fn goto_sends_composite_command() {
    let (mut controller, mount) = connected(MountReplies::default()).await;

    controller.goto_ra_dec(15.5, 26.0).await.unwrap();
    assert_eq!(controller.status(), MountStatus::Slewing);
    controller.goto_ra_dec(-15.0, -10.25).await.unwrap();

    assert_eq!(
        mount.frames(),
        vec![":X11.033333,26.000000", ":X123.000000,-10.250000"]
    );

    // the next successful position read ends the slew
    controller.get_ra_dec().await.unwrap();
    assert_eq!(controller.status(), MountStatus::Ready);
}

#[tokio::test]
async fn goto_altaz_at_zenith_targets_site_latitude() {
    let (mut controller, mount) = connected(MountReplies::default()).await;

    let target = controller.goto_altaz(180.0, 90.0).await.unwrap();
    assert_abs_diff_eq!(target.dec, 39.9164, epsilon = 1e-6);

    let frames = mount.frames();
    assert_eq!(frames.len(), 1);
    let payload = frames[0].strip_prefix(":X1").unwrap();
    let (_, dec) = payload.split_once(',').unwrap();
    assert_abs_diff_eq!(dec.parse::<f64>().unwrap(), 39.9164, epsilon = 1e-6);
}

#[tokio::test]
async fn slew_sends_targets_speeds_and_starts() {
    let (mut controller, mount) = connected(MountReplies::default()).await;

    controller.slew_to_coordinates(90.0, -45.0).await.unwrap();

    assert_eq!(
        mount.frames(),
        vec![
            ":S1008813",
            ":S2005C44",
            ":I18E3700",
            ":I28E3700",
            ":J1",
            ":J2",
        ]
    );
    assert_eq!(controller.status(), MountStatus::Slewing);
}

#[tokio::test]
async fn slew_aborts_at_first_failure() {
    let replies = MountReplies::default().reject(":I2");
    let (mut controller, mount) = connected(replies).await;

    let err = controller.slew_to_coordinates(90.0, -45.0).await.unwrap_err();

    match err {
        MountError::Channel { step, source } => {
            assert_eq!(step, "set DEC speed");
            assert!(matches!(source, ChannelError::DeviceRejected(code) if code == "0"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(mount.frames().len(), 4);
    assert_eq!(controller.status(), MountStatus::Ready);
    assert!(controller
        .diagnostics()
        .last()
        .unwrap()
        .starts_with("set DEC speed"));
}

#[tokio::test]
async fn jog_and_stop() {
    let (mut controller, mount) = connected(MountReplies::default()).await;

    controller
        .move_dec(Direction::Reverse, DEFAULT_JOG_SPEED)
        .await
        .unwrap();
    assert_eq!(controller.status(), MountStatus::Jogging);
    controller.move_ra(Direction::Forward, 0x4000).await.unwrap();

    controller.stop_all().await.unwrap();
    assert_eq!(controller.status(), MountStatus::Ready);

    assert_eq!(
        mount.frames(),
        vec![
            ":I21", ":I2000100", ":J2", ":I10", ":I1004000", ":J1", ":K1", ":K2",
        ]
    );
}

#[tokio::test]
async fn stop_all_stops_dec_when_ra_fails() {
    let replies = MountReplies::default().ignore(":K1");
    let (mut controller, mount) = connected(replies).await;

    let err = controller.stop_all().await.unwrap_err();
    assert!(matches!(
        err,
        MountError::Channel {
            source: ChannelError::Timeout(_),
            ..
        }
    ));
    assert_eq!(mount.frames(), vec![":K1", ":K2"]);
}

#[tokio::test]
async fn tracking_and_version() {
    let (mut controller, mount) = connected(MountReplies::default()).await;

    controller
        .set_tracking_mode(TrackingMode::Sidereal)
        .await
        .unwrap();
    assert_eq!(controller.get_version().await.unwrap(), "020A01");
    assert_eq!(mount.frames(), vec![":T11", ":e1"]);
}

#[tokio::test]
async fn set_location_updates_hemisphere() {
    let (mut controller, mount) = connected(MountReplies::default()).await;
    assert_eq!(controller.state().hemisphere(), Hemisphere::North);

    controller.set_location(-33.8568, 151.2153, 58).await.unwrap();
    assert_eq!(controller.state().hemisphere(), Hemisphere::South);

    let err = controller.set_location(12.0, 181.0, 0).await.unwrap_err();
    assert!(matches!(err, MountError::InvalidLocation { .. }));

    assert_eq!(mount.frames(), vec![":Z1-33.8568,+151.2153,+058"]);
    assert_eq!(controller.state().observer().unwrap().longitude, 151.2153);
}

#[tokio::test]
async fn set_time_validates_fields() {
    let (mut controller, mount) = connected(MountReplies::default()).await;
    let time = MountTime {
        year: 2025,
        month: 7,
        day: 4,
        hour: 3,
        minute: 9,
        second: 59,
        tz_hours: -5,
    };

    controller.set_time(time).await.unwrap();
    let err = controller
        .set_time(MountTime { minute: 60, ..time })
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::InvalidTime(_)));

    assert_eq!(mount.frames(), vec![":T120250704030959-05"]);
}

#[tokio::test]
async fn wait_for_target_polls_position() {
    let replies = MountReplies::default().positions("10.0", "20.0");
    let (mut controller, _mount) = connected(replies).await;

    let reached = controller
        .wait_for_target(
            RaDec::new(10.0005, 20.0),
            0.01,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(reached, RaDec::new(10.0, 20.0));

    let err = controller
        .wait_for_target(
            RaDec::new(50.0, 20.0),
            0.01,
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MountError::SlewTimeout(_)));
}

#[tokio::test]
async fn disconnect_closes_the_link() {
    let (mut controller, mount) = connected(MountReplies::default()).await;

    controller.disconnect();
    assert_eq!(controller.status(), MountStatus::Disconnected);

    let err = controller.stop(Axis::RightAscension).await.unwrap_err();
    assert!(matches!(
        err,
        MountError::Channel {
            source: ChannelError::LinkNotOpen,
            ..
        }
    ));
    assert!(mount.frames().is_empty());
}
