//! A scripted stand-in for the observed page.
//!
//! The real deployment implements [`PagePort`] against a live browser tab;
//! this simulator plays back a timeline of scenes instead, which is enough
//! to exercise the whole pipeline from the command line and from
//! integration tests.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use page_locator::{ElementDescriptor, ElementHandle, LocatorError, PagePort, VideoState};

/// One scene of the scripted timeline, held for `hold_ms` before the next
/// scene begins. The final scene holds forever.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimScene {
    pub hold_ms: u64,
    pub media: bool,
    pub video_id: Option<String>,
    pub ad_id: Option<String>,
    pub current_time_s: f64,
    pub duration_s: f64,
    pub ended: bool,
    pub skip_button: bool,
    pub skip_text: Option<String>,
    pub overlay_text: Option<String>,
}

impl Default for SimScene {
    fn default() -> Self {
        Self {
            hold_ms: 1_000,
            media: true,
            video_id: None,
            ad_id: None,
            current_time_s: 0.0,
            duration_s: 0.0,
            ended: false,
            skip_button: false,
            skip_text: None,
            overlay_text: None,
        }
    }
}

pub struct SimulatedPage {
    started: Instant,
    scenes: Vec<SimScene>,
}

impl SimulatedPage {
    pub fn new(scenes: Vec<SimScene>) -> Self {
        Self {
            started: Instant::now(),
            scenes,
        }
    }

    fn scene(&self) -> SimScene {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let mut offset = 0u64;
        for scene in &self.scenes {
            offset += scene.hold_ms;
            if elapsed_ms < offset {
                return scene.clone();
            }
        }
        self.scenes.last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl PagePort for SimulatedPage {
    async fn player_present(&self) -> bool {
        self.scene().media
    }

    async fn is_media_route(&self) -> bool {
        self.scene().media
    }

    async fn page_url(&self) -> Result<Option<String>, LocatorError> {
        Ok(self
            .scene()
            .video_id
            .map(|id| format!("https://media.example/watch?v={id}")))
    }

    async fn player_config(&self) -> Result<Option<Value>, LocatorError> {
        let scene = self.scene();
        let mut config = serde_json::Map::new();
        if let Some(video) = scene.video_id {
            config.insert("debugVideoId".into(), json!(video));
        }
        if let Some(ad) = scene.ad_id {
            config.insert("debugAdId".into(), json!(ad));
        }
        if config.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::Object(config)))
        }
    }

    async fn debug_text(&self) -> Result<Option<String>, LocatorError> {
        let scene = self.scene();
        match (scene.video_id, scene.ad_id) {
            (Some(video), Some(ad)) => Ok(Some(format!("vid={video} ad={ad}"))),
            (Some(video), None) => Ok(Some(format!("vid={video}"))),
            _ => Ok(None),
        }
    }

    async fn initial_response(&self) -> Result<Option<Value>, LocatorError> {
        Ok(None)
    }

    async fn page_metadata(&self) -> Result<Option<Value>, LocatorError> {
        Ok(None)
    }

    async fn visible_text(&self) -> Result<Option<String>, LocatorError> {
        Ok(self.scene().overlay_text)
    }

    async fn query(
        &self,
        descriptor: ElementDescriptor,
    ) -> Result<Option<ElementHandle>, LocatorError> {
        let scene = self.scene();
        Ok(match descriptor {
            ElementDescriptor::SkipButton if scene.skip_button => {
                Some(ElementHandle::new(1, true, Some("Skip Ad".into())))
            }
            ElementDescriptor::SkipCountdownText => scene
                .skip_text
                .map(|text| ElementHandle::new(2, true, Some(text))),
            ElementDescriptor::AdContainer if scene.ad_id.is_some() => {
                Some(ElementHandle::new(3, true, scene.overlay_text))
            }
            ElementDescriptor::AdOverlayText => scene
                .overlay_text
                .map(|text| ElementHandle::new(4, true, Some(text))),
            ElementDescriptor::VideoElement if scene.media => {
                Some(ElementHandle::new(5, true, None))
            }
            _ => None,
        })
    }

    async fn video_state(&self) -> Result<Option<VideoState>, LocatorError> {
        let scene = self.scene();
        if !scene.media {
            return Ok(None);
        }
        Ok(Some(VideoState {
            current_time_s: scene.current_time_s,
            duration_s: scene.duration_s,
            ended: scene.ended,
        }))
    }
}

/// The built-in demo timeline: pre-roll ad, playback, a mid-roll break of
/// two consecutive ads, then playback to the end.
pub fn demo_script() -> Vec<SimScene> {
    vec![
        SimScene {
            hold_ms: 2_000,
            video_id: Some("demo-video".into()),
            ad_id: Some("pre-roll-spot".into()),
            current_time_s: 0.0,
            duration_s: 480.0,
            skip_button: true,
            skip_text: Some("Skip in 5".into()),
            overlay_text: Some("0:15".into()),
            ..Default::default()
        },
        SimScene {
            hold_ms: 3_000,
            video_id: Some("demo-video".into()),
            current_time_s: 60.0,
            duration_s: 480.0,
            ..Default::default()
        },
        SimScene {
            hold_ms: 2_000,
            video_id: Some("demo-video".into()),
            ad_id: Some("mid-roll-a".into()),
            current_time_s: 240.0,
            duration_s: 480.0,
            overlay_text: Some("0:06".into()),
            ..Default::default()
        },
        SimScene {
            hold_ms: 2_000,
            video_id: Some("demo-video".into()),
            ad_id: Some("mid-roll-b".into()),
            current_time_s: 240.0,
            duration_s: 480.0,
            skip_button: true,
            ..Default::default()
        },
        SimScene {
            hold_ms: 3_000,
            video_id: Some("demo-video".into()),
            current_time_s: 470.0,
            duration_s: 480.0,
            ..Default::default()
        },
    ]
}
