use std::sync::mpsc::Receiver;
use std::task::Poll;

use glam::{Quat, Vec3};
use pano_stream::HotspotSpec;
use pano_viewer::events::drain;
use pano_viewer::headless::{AdaptiveCall, HeadlessPlatform};
use pano_viewer::ports::{AdaptiveConfig, MaterialDesc, MediaElementId, MediaKind, Pose};
use pano_viewer::viewer::compositor::SphereSource;
use pano_viewer::viewer::display::DisplayApi;
use pano_viewer::viewer::mesh::MeshVertex;
use pano_viewer::viewer::hotspots::{HotspotError, HotspotEvent};
use pano_viewer::{
    PlatformProfile, SceneDescriptor, SceneState, ViewerError, ViewerEvent, ViewportController,
};

const IE11: &str = "Mozilla/5.0 (Windows NT 10.0; Trident/7.0; rv:11.0) like Gecko";
const IOS9_SAFARI: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 9_3_5 like Mac OS X) \
     AppleWebKit/601.1.46 (KHTML, like Gecko) Version/9.0 Mobile/13G36 Safari/601.1";

fn controller(platform: &HeadlessPlatform) -> (ViewportController, Receiver<ViewerEvent>) {
    controller_for(platform, PlatformProfile::default())
}

fn controller_for(
    platform: &HeadlessPlatform,
    profile: PlatformProfile,
) -> (ViewportController, Receiver<ViewerEvent>) {
    let mut controller = ViewportController::new(platform.ports(), profile, 1280, 720);
    let events = controller.subscribe();
    (controller, events)
}

fn image(url: &str) -> SceneDescriptor {
    SceneDescriptor::builder().image(url).build()
}

fn errors(events: &[ViewerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ViewerEvent::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn only_element(platform: &HeadlessPlatform, kind: MediaKind) -> MediaElementId {
    let world = platform.world();
    let mut matching = world
        .elements
        .iter()
        .filter(|(_, state)| state.kind == kind)
        .map(|(id, _)| *id);
    let element = matching.next().expect("element of that kind");
    assert!(matching.next().is_none(), "exactly one {kind:?} element");
    element
}

fn hotspot(id: &str) -> HotspotSpec {
    HotspotSpec {
        id: id.to_string(),
        pitch: 0.0,
        yaw: 0.0,
        radius: 0.2,
        distance: 1.0,
    }
}

#[test]
fn image_scene_attaches_two_eyes_sharing_one_texture() {
    let platform = HeadlessPlatform::new();
    let (mut controller, events) = controller(&platform);
    let load = controller.set_scene(image("pano.jpg")).expect("valid scene");
    assert_eq!(controller.state(), SceneState::Loading);
    assert_eq!(controller.poll_scene(&load), Poll::Pending);

    platform.pump(&mut controller);

    assert_eq!(controller.state(), SceneState::Loaded);
    assert_eq!(controller.poll_scene(&load), Poll::Ready(Ok(())));
    let eyes = controller.compositor().eyes().expect("eyes attached");
    assert_eq!(
        eyes.source,
        SphereSource::Photo {
            url: "pano.jpg".to_string()
        }
    );
    let world = platform.world();
    assert_eq!(world.live_textures.len(), 1);
    for eye in [&eyes.left, &eyes.right] {
        assert_eq!(
            world.live_materials.get(&eye.material),
            Some(&MaterialDesc::Textured {
                texture: eyes.texture
            })
        );
        let geometry = &world.live_geometries[&eye.geometry];
        assert_eq!(
            geometry.uploaded_bytes,
            geometry.vertex_count * std::mem::size_of::<MeshVertex>() + geometry.index_count * 2
        );
    }
    drop(world);

    let events = drain(&events);
    assert!(matches!(
        events.as_slice(),
        [ViewerEvent::Loaded { video: None, .. }]
    ));
}

#[test]
fn invalid_scene_requests_nothing() {
    let platform = HeadlessPlatform::new();
    let (mut controller, events) = controller(&platform);
    let err = controller
        .set_scene(SceneDescriptor::builder().build())
        .expect_err("missing urls");
    assert_eq!(
        err,
        ViewerError::InvalidScene("Either image or video URL must be specified.".to_string())
    );
    assert!(platform.texture_requests().is_empty());
    assert!(platform.world().elements.is_empty());
    assert_eq!(controller.state(), SceneState::Idle);
    assert_eq!(
        errors(&drain(&events)),
        vec!["Either image or video URL must be specified.".to_string()]
    );
}

#[test]
fn invalid_scene_keeps_the_previous_one() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller.set_scene(image("a.jpg")).expect("valid scene");
    platform.pump(&mut controller);
    assert!(controller.set_scene(SceneDescriptor::builder().build()).is_err());
    assert_eq!(controller.state(), SceneState::Loaded);
    assert!(controller.compositor().eyes().is_some());
}

#[test]
fn stereo_scene_splits_texture_vertically() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller
        .set_scene(SceneDescriptor::builder().image("stereo.jpg").stereo(true).build())
        .expect("valid scene");
    platform.pump(&mut controller);

    let eyes = controller.compositor().eyes().expect("eyes attached");
    let world = platform.world();
    let (left_min, left_max) = world.live_geometries[&eyes.left.geometry].v_range;
    let (right_min, right_max) = world.live_geometries[&eyes.right.geometry].v_range;
    assert!((left_min - 0.5).abs() < 1e-6 && (left_max - 1.0).abs() < 1e-6);
    assert!(right_min.abs() < 1e-6 && (right_max - 0.5).abs() < 1e-6);
}

#[test]
fn mono_scene_uses_the_full_texture_for_both_eyes() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller.set_scene(image("mono.jpg")).expect("valid scene");
    platform.pump(&mut controller);

    let eyes = controller.compositor().eyes().expect("eyes attached");
    let world = platform.world();
    for eye in [&eyes.left, &eyes.right] {
        let (min, max) = world.live_geometries[&eye.geometry].v_range;
        assert!(min.abs() < 1e-6 && (max - 1.0).abs() < 1e-6);
    }
}

#[test]
fn newer_scene_wins_a_fast_double_load() {
    let platform = HeadlessPlatform::new();
    let (mut controller, events) = controller(&platform);
    let first = controller.set_scene(image("a.jpg")).expect("valid scene");
    let second = controller.set_scene(image("b.jpg")).expect("valid scene");

    platform.pump(&mut controller);

    assert_eq!(
        controller.poll_scene(&first),
        Poll::Ready(Err(ViewerError::Superseded))
    );
    assert_eq!(controller.poll_scene(&second), Poll::Ready(Ok(())));
    let eyes = controller.compositor().eyes().expect("eyes attached");
    assert_eq!(
        eyes.source,
        SphereSource::Photo {
            url: "b.jpg".to_string()
        }
    );
    let world = platform.world();
    assert_eq!(world.live_textures.len(), 1, "stale texture released");
    assert_eq!(world.released_textures.len(), 1);
    drop(world);

    let loaded: Vec<u64> = drain(&events)
        .into_iter()
        .filter_map(|event| match event {
            ViewerEvent::Loaded { generation, .. } => Some(generation),
            _ => None,
        })
        .collect();
    assert_eq!(loaded, vec![second.generation()]);
}

#[test]
fn image_replacing_a_loading_video_ignores_its_late_signals() {
    let platform = HeadlessPlatform::new();
    let (mut controller, events) = controller(&platform);
    let first = controller
        .set_scene(SceneDescriptor::builder().video("clip.mp4").build())
        .expect("valid scene");
    let stale = only_element(&platform, MediaKind::Video);
    let second = controller.set_scene(image("b.jpg")).expect("valid scene");

    // The queued canplaythrough for the released element arrives here.
    platform.pump(&mut controller);

    assert_eq!(
        controller.poll_scene(&first),
        Poll::Ready(Err(ViewerError::Superseded))
    );
    assert_eq!(controller.poll_scene(&second), Poll::Ready(Ok(())));
    assert!(platform.element(stale).expect("element").released);
    assert!(!controller.has_video());
    let eyes = controller.compositor().eyes().expect("eyes attached");
    assert_eq!(
        eyes.source,
        SphereSource::Photo {
            url: "b.jpg".to_string()
        }
    );

    let drained = drain(&events);
    assert!(errors(&drained).is_empty());
    let loaded: Vec<u64> = drained
        .into_iter()
        .filter_map(|event| match event {
            ViewerEvent::Loaded { generation, .. } => Some(generation),
            _ => None,
        })
        .collect();
    assert_eq!(loaded, vec![second.generation()]);
}

#[test]
fn preview_shows_first_then_full_image() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    let load = controller
        .set_scene(
            SceneDescriptor::builder()
                .image("full.jpg")
                .preview("thumb.jpg")
                .build(),
        )
        .expect("valid scene");

    platform.pump_once(&mut controller);
    assert_eq!(controller.poll_scene(&load), Poll::Ready(Ok(())));
    let eyes = controller.compositor().eyes().expect("preview attached");
    assert_eq!(
        eyes.source,
        SphereSource::Photo {
            url: "thumb.jpg".to_string()
        }
    );

    platform.pump(&mut controller);
    let eyes = controller.compositor().eyes().expect("full attached");
    assert_eq!(
        eyes.source,
        SphereSource::Photo {
            url: "full.jpg".to_string()
        }
    );
    let urls: Vec<String> = platform
        .texture_requests()
        .into_iter()
        .map(|(_, url)| url)
        .collect();
    assert_eq!(urls, vec!["thumb.jpg".to_string(), "full.jpg".to_string()]);
    assert_eq!(platform.world().live_textures.len(), 1);
}

#[test]
fn failed_full_image_keeps_the_preview() {
    let platform = HeadlessPlatform::new();
    platform.fail_url("full.jpg");
    let (mut controller, events) = controller(&platform);
    let load = controller
        .set_scene(
            SceneDescriptor::builder()
                .image("full.jpg")
                .preview("thumb.jpg")
                .build(),
        )
        .expect("valid scene");
    platform.pump(&mut controller);

    assert_eq!(controller.poll_scene(&load), Poll::Ready(Ok(())));
    assert!(controller.compositor().eyes().is_some());
    assert_eq!(
        errors(&drain(&events)),
        vec!["Unable to load texture from \"full.jpg\"".to_string()]
    );
}

#[test]
fn failed_image_settles_with_an_error() {
    let platform = HeadlessPlatform::new();
    platform.fail_url("missing");
    let (mut controller, events) = controller(&platform);
    let load = controller.set_scene(image("missing.jpg")).expect("valid scene");
    platform.pump(&mut controller);

    assert_eq!(controller.state(), SceneState::Failed);
    assert!(matches!(
        controller.poll_scene(&load),
        Poll::Ready(Err(ViewerError::Load(_)))
    ));
    assert_eq!(errors(&drain(&events)).len(), 1);
}

#[test]
fn hls_off_safari_fails_exactly_once() {
    let platform = HeadlessPlatform::new();
    let (mut controller, events) = controller(&platform);
    let load = controller
        .set_scene(SceneDescriptor::builder().video("https://cdn.example/live.m3u8").build())
        .expect("valid scene");
    platform.pump(&mut controller);
    controller.render(0.0);
    platform.pump(&mut controller);

    assert_eq!(
        controller.poll_scene(&load),
        Poll::Ready(Err(ViewerError::PlatformUnsupported(
            "Video load error: HLS is only supported on Safari.".to_string()
        )))
    );
    assert_eq!(
        errors(&drain(&events)),
        vec!["Video load error: HLS is only supported on Safari.".to_string()]
    );
    assert!(controller.compositor().eyes().is_none());
}

#[test]
fn dash_configures_bandwidth_before_loading() {
    let platform = HeadlessPlatform::new();
    let (mut controller, events) = controller(&platform);
    let url = "https://cdn.example/stream.mpd";
    controller
        .set_scene(SceneDescriptor::builder().video(url).build())
        .expect("valid scene");

    let calls = platform.adaptive_calls();
    let configure = calls
        .iter()
        .position(|call| {
            *call
                == AdaptiveCall::Configure(AdaptiveConfig {
                    default_bandwidth_estimate: 1_000_000,
                })
        })
        .expect("configured");
    let load = calls
        .iter()
        .position(|call| *call == AdaptiveCall::Load(url.to_string()))
        .expect("loaded");
    assert!(configure < load);
    assert_eq!(calls[0], AdaptiveCall::InstallPolyfills);

    platform.pump(&mut controller);
    let loaded = drain(&events).into_iter().find_map(|event| match event {
        ViewerEvent::Loaded {
            video, duration, ..
        } => Some((video, duration)),
        _ => None,
    });
    let (video, duration) = loaded.expect("loaded event");
    assert!(video.is_some());
    assert_eq!(duration, Some(30.0));
}

#[test]
fn dash_without_a_supported_client_fails() {
    let platform = HeadlessPlatform::new();
    platform.set_adaptive_supported(false);
    let (mut controller, _events) = controller(&platform);
    let load = controller
        .set_scene(SceneDescriptor::builder().video("clip.mpd").build())
        .expect("valid scene");
    assert!(matches!(
        controller.poll_scene(&load),
        Poll::Ready(Err(ViewerError::PlatformUnsupported(_)))
    ));
}

#[test]
fn ie11_falls_back_to_the_image() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) =
        controller_for(&platform, PlatformProfile::from_user_agent(IE11));
    controller
        .set_scene(
            SceneDescriptor::builder()
                .video("clip.mp4")
                .image("still.jpg")
                .build(),
        )
        .expect("valid scene");
    platform.pump(&mut controller);
    assert!(platform.world().elements.is_empty());
    assert_eq!(controller.state(), SceneState::Loaded);

    let load = controller
        .set_scene(SceneDescriptor::builder().video("clip.mp4").build())
        .expect("valid scene");
    assert_eq!(
        controller.poll_scene(&load),
        Poll::Ready(Err(ViewerError::PlatformUnsupported(
            "Video is not supported on IE11.".to_string()
        )))
    );
}

#[test]
fn switching_scenes_releases_the_video() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller
        .set_scene(SceneDescriptor::builder().video("clip.mp4").build())
        .expect("valid scene");
    platform.pump(&mut controller);
    let element = controller.active_video().expect("video ready");
    controller.play().expect("play");

    controller.set_scene(image("after.jpg")).expect("valid scene");
    let state = platform.element(element).expect("element");
    assert!(state.released);
    assert!(state.paused);
    assert!(state.src.is_none());
    assert!(!controller.has_video());
}

#[test]
fn fake_playback_keeps_the_scene_muted() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) =
        controller_for(&platform, PlatformProfile::from_user_agent(IOS9_SAFARI));
    controller
        .set_scene(
            SceneDescriptor::builder()
                .video("clip.mp4")
                .muted(true)
                .volume(0.2)
                .build(),
        )
        .expect("valid scene");
    platform.pump(&mut controller);
    controller.play().expect("play");

    let video = controller.active_video().expect("video ready");
    assert!(platform.element(video).expect("video").muted);
    let audio = platform
        .element(only_element(&platform, MediaKind::Audio))
        .expect("audio");
    assert!(!audio.paused);
    assert!(audio.muted);
    assert!((audio.volume - 0.2).abs() < 1e-9);

    // Read-only volume must not unmute what the scene muted.
    controller.set_volume(0.5).expect("set volume");
    assert!(platform.element(video).expect("video").muted);
}

#[test]
fn playback_without_video_names_the_action() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller.set_scene(image("a.jpg")).expect("valid scene");
    platform.pump(&mut controller);
    assert_eq!(
        controller.play().expect_err("no video").to_string(),
        "Attempt to play, but no video found."
    );
    assert_eq!(
        controller.set_volume(0.5).expect_err("no video").to_string(),
        "Attempt to set volume, but no video found."
    );
}

#[test]
fn opacity_fades_monotonically() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller.set_scene(image("a.jpg")).expect("valid scene");
    platform.pump(&mut controller);

    let out = controller.set_opacity(0.0, 500.0);
    let mut readings = Vec::new();
    let mut now = 0.0;
    while controller.poll_opacity(out).is_pending() {
        controller.render(now);
        readings.push(controller.compositor().mask_opacity());
        now += 50.0;
        assert!(now < 2000.0, "fade out never settled");
    }
    assert!(readings.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(readings.last().copied(), Some(1.0));

    let back = controller.set_opacity(1.0, 500.0);
    let mut readings = Vec::new();
    while controller.poll_opacity(back).is_pending() {
        controller.render(now);
        readings.push(controller.compositor().mask_opacity());
        now += 50.0;
        assert!(now < 4000.0, "fade in never settled");
    }
    assert!(readings.windows(2).all(|pair| pair[0] >= pair[1]));
    assert_eq!(readings.last().copied(), Some(0.0));
}

#[test]
fn duplicate_hotspot_is_rejected() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller.add_hotspot(&hotspot("door")).expect("first add");
    assert_eq!(
        controller.add_hotspot(&hotspot("door")),
        Err(HotspotError::DuplicateId("door".to_string()))
    );
    assert_eq!(controller.hotspots().len(), 1);
    assert_eq!(
        controller.remove_hotspot("window"),
        Err(HotspotError::UnknownId("window".to_string()))
    );
}

fn enter_vr(platform: &HeadlessPlatform, controller: &mut ViewportController) {
    controller.enter_vr().expect("present");
    platform.pump(controller);
    assert!(controller.is_presenting());
}

#[test]
fn vr_dwell_clicks_exactly_once() {
    let platform = HeadlessPlatform::new();
    let (mut controller, events) = controller(&platform);
    controller.attach_display(DisplayApi::WebVr, platform.vr_device("Headset"));
    controller.set_scene(image("a.jpg")).expect("valid scene");
    platform.pump(&mut controller);
    controller.add_hotspot(&hotspot("door")).expect("add");
    enter_vr(&platform, &mut controller);
    assert!(controller.reticle_visible());

    let mut now = 0.0;
    while now <= 4000.0 {
        controller.render(now);
        now += 100.0;
    }

    let events = drain(&events);
    let clicks: Vec<&ViewerEvent> = events
        .iter()
        .filter(|event| matches!(event, ViewerEvent::Hotspot(HotspotEvent::Click(_))))
        .collect();
    assert_eq!(
        clicks,
        vec![&ViewerEvent::Hotspot(HotspotEvent::Click(Some("door".to_string())))]
    );
    assert!(events.contains(&ViewerEvent::ModeChange { presenting: true }));
    assert_eq!(controller.submitted_frames(), controller.frames());
}

#[test]
fn head_height_is_applied_once() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller.attach_display(DisplayApi::WebVr, platform.vr_device("Headset"));
    platform.set_pose(Pose {
        orientation: Quat::IDENTITY,
        position: Vec3::new(0.0, 1.6, 0.0),
    });
    controller.set_scene(image("a.jpg")).expect("valid scene");
    platform.pump(&mut controller);
    controller.add_hotspot(&hotspot("door")).expect("add");
    enter_vr(&platform, &mut controller);

    for frame in 0..5 {
        controller.render(f64::from(frame) * 16.0);
    }

    let frame = platform.last_frame().expect("drawn");
    let head = Vec3::new(0.0, 1.6, 0.0);
    assert!(frame.camera_position.abs_diff_eq(head, 1e-6));
    assert!(frame.content_offset.abs_diff_eq(head, 1e-6));
    assert!(frame.stereo_output);
    let sprite = &frame.hotspots[0];
    assert!(sprite.center.abs_diff_eq(Vec3::new(0.0, 1.6, -1.0), 1e-5));
    assert!(controller.hotspots().is_focused("door"));
}

#[test]
fn content_follows_only_the_tracked_head_height() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller.attach_display(DisplayApi::WebVr, platform.vr_device("Headset"));
    platform.set_pose(Pose {
        orientation: Quat::IDENTITY,
        position: Vec3::new(0.3, 1.7, -0.2),
    });
    controller.set_scene(image("a.jpg")).expect("valid scene");
    platform.pump(&mut controller);
    controller.add_hotspot(&hotspot("door")).expect("add");
    enter_vr(&platform, &mut controller);
    controller.render(0.0);

    let frame = platform.last_frame().expect("drawn");
    assert!(frame
        .camera_position
        .abs_diff_eq(Vec3::new(0.3, 1.7, -0.2), 1e-6));
    assert!(frame.content_offset.abs_diff_eq(Vec3::new(0.0, 1.7, 0.0), 1e-6));
    assert!(frame.hotspots[0]
        .center
        .abs_diff_eq(Vec3::new(0.0, 1.7, -1.0), 1e-5));
}

#[test]
fn leaving_vr_reports_mode_change() {
    let platform = HeadlessPlatform::new();
    let (mut controller, events) = controller(&platform);
    controller.attach_display(DisplayApi::WebVr, platform.vr_device("Headset"));
    controller.set_scene(image("a.jpg")).expect("valid scene");
    platform.pump(&mut controller);
    enter_vr(&platform, &mut controller);
    controller.exit_vr();
    platform.pump(&mut controller);

    assert!(!controller.is_presenting());
    let modes: Vec<bool> = drain(&events)
        .into_iter()
        .filter_map(|event| match event {
            ViewerEvent::ModeChange { presenting } => Some(presenting),
            _ => None,
        })
        .collect();
    assert_eq!(modes, vec![true, false]);
}

#[test]
fn vr_off_scene_refuses_presentation() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller.attach_display(DisplayApi::WebVr, platform.vr_device("Headset"));
    controller
        .set_scene(SceneDescriptor::builder().image("a.jpg").vr_off(true).build())
        .expect("valid scene");
    assert_eq!(controller.enter_vr(), Err(ViewerError::DisplayUnavailable));
}

#[test]
fn destroy_releases_everything() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller
        .set_scene(SceneDescriptor::builder().video("clip.mp4").build())
        .expect("valid scene");
    platform.pump(&mut controller);
    controller.destroy();

    assert_eq!(controller.state(), SceneState::Disposed);
    let world = platform.world();
    assert!(world.live_textures.is_empty());
    assert!(world.live_materials.is_empty());
    assert!(world.live_geometries.is_empty());
    assert_eq!(world.live_elements(), 0);
    drop(world);
    assert_eq!(
        controller.set_scene(image("a.jpg")),
        Err(ViewerError::Disposed)
    );
}

#[test]
fn texture_arriving_after_destroy_is_released() {
    let platform = HeadlessPlatform::new();
    let (mut controller, _events) = controller(&platform);
    controller.set_scene(image("a.jpg")).expect("valid scene");
    controller.destroy();
    platform.pump(&mut controller);
    let world = platform.world();
    assert!(world.live_textures.is_empty());
    assert_eq!(world.released_textures.len(), 1);
}
