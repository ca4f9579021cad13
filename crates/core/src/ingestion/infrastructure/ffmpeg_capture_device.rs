use thiserror::Error;

use crate::config::CaptureConfig;
use crate::ingestion::domain::capture_device::CaptureDevice;
use crate::shared::emotion::now_seconds;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("ffmpeg initialisation failed: {0}")]
    Init(#[source] ffmpeg_next::Error),
    #[error("input format '{0}' is not available in this ffmpeg build")]
    NoInputFormat(&'static str),
    #[error("failed to open capture device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: ffmpeg_next::Error,
    },
    #[error("capture device {0} exposes no video stream")]
    NoVideoStream(String),
    #[error("failed to set up decoder: {0}")]
    Decoder(#[source] ffmpeg_next::Error),
}

/// Live camera capture through libavdevice.
///
/// Uses the platform's native input format (v4l2, avfoundation or dshow),
/// decodes whatever pixel format the camera delivers and converts to RGB24.
pub struct FfmpegCaptureDevice {
    state: Option<OpenDevice>,
}

// Safety: the device is owned by the capture loop thread and never shared.
// The raw pointers inside ffmpeg types are not aliased across threads.
unsafe impl Send for FfmpegCaptureDevice {}

struct OpenDevice {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    frame_index: usize,
}

impl FfmpegCaptureDevice {
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        ffmpeg_next::init().map_err(CaptureError::Init)?;
        ffmpeg_next::device::register_all();

        let (format_name, default_path) = platform_input(config.device_index);
        let path = config.device_path.clone().unwrap_or(default_path);

        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == format_name)
            .ok_or(CaptureError::NoInputFormat(format_name))?;

        let mut options = ffmpeg_next::Dictionary::new();
        options.set("video_size", &format!("{}x{}", config.width, config.height));
        options.set("framerate", &config.fps.to_string());
        #[cfg(target_os = "windows")]
        options.set("video_device_number", &config.device_index.to_string());

        let input = ffmpeg_next::format::open_with(
            &path,
            &ffmpeg_next::format::Format::Input(format),
            options,
        )
        .map_err(|source| CaptureError::Open {
            path: path.clone(),
            source,
        })?
        .input();

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CaptureError::NoVideoStream(path.clone()))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(CaptureError::Decoder)?;
        let decoder = codec_ctx.decoder().video().map_err(CaptureError::Decoder)?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(CaptureError::Decoder)?;

        log::info!("Opened capture device {path} via {format_name} ({width}x{height})");

        Ok(Self {
            state: Some(OpenDevice {
                input,
                decoder,
                scaler,
                stream_index,
                width,
                height,
                frame_index: 0,
            }),
        })
    }
}

impl CaptureDevice for FfmpegCaptureDevice {
    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let Some(device) = self.state.as_mut() else {
            return Err("capture device is closed".into());
        };

        loop {
            let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
            if device.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
                device.scaler.run(&decoded, &mut rgb_frame)?;
                let pixels = extract_rgb_pixels(&rgb_frame, device.width, device.height);
                let frame = Frame::new(pixels, device.width, device.height, 3, device.frame_index)
                    .with_timestamp(now_seconds());
                device.frame_index += 1;
                return Ok(Some(frame));
            }

            let Some((stream, packet)) = device.input.packets().next() else {
                return Ok(None);
            };
            if stream.index() != device.stream_index {
                continue;
            }
            device.decoder.send_packet(&packet)?;
        }
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!("Capture device released");
        }
    }
}

/// Input format name and default device path for the current platform.
fn platform_input(device_index: u32) -> (&'static str, String) {
    #[cfg(target_os = "macos")]
    {
        ("avfoundation", format!("{device_index}:none"))
    }
    #[cfg(target_os = "windows")]
    {
        // dshow addresses cameras by name; `device_path` overrides this default
        // and `video_device_number` picks among same-named devices.
        let _ = device_index;
        ("dshow", "video=Integrated Camera".to_string())
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        ("v4l2", format!("/dev/video{device_index}"))
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly packed RGB buffer,
/// dropping any per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}
