//! Top-level owner of the rig's devices.
//!
//! [`Rig::connect`] finds both controllers on the serial bus, claims every
//! device from one [`DeviceRegistry`], boots the stage and opens the camera.
//! The individual workflows borrow the devices from here.

use crate::autofocus::{AutofocusEngine, AutofocusReport, FocusSample};
use crate::capture::{CameraDevice, CaptureEngine};
use crate::config::{millis, settle, RigConfig};
use crate::errors::Result;
use crate::filter;
use crate::focus_stack::{FocusMerger, FocusStackResult, FocusStackTool, FocusStacker};
use crate::lens::{LensCatalog, LensProfile};
use crate::light::LightState;
use crate::motion::MotionState;
use crate::registry::DeviceRegistry;
use crate::scan::{
    ScanOrchestrator, ScanOutcome, ScanPattern, ScanRequest, TileStitcher, XyStitchTool,
};
use crate::serial::{discover_devices, PortLink, SerialLink};
use std::sync::Arc;

pub struct Rig {
    config: RigConfig,
    catalog: LensCatalog,
    motion: MotionState,
    light: LightState,
    camera: CaptureEngine,
    registry: DeviceRegistry,
}

impl Rig {
    /// Discover the controllers, boot the stage with lens `lens_id` and open
    /// the native camera.
    #[cfg(feature = "native-camera")]
    pub fn connect(config: RigConfig, lens_id: &str) -> Result<Self> {
        let camera = crate::platform::NokhwaCamera::new(config.camera.device_index);
        Self::connect_with_camera(config, lens_id, Box::new(camera))
    }

    /// Like [`Rig::connect`] with a caller supplied camera.
    pub fn connect_with_camera(
        config: RigConfig,
        lens_id: &str,
        camera: Box<dyn CameraDevice>,
    ) -> Result<Self> {
        config.validate()?;
        let catalog = LensCatalog::load(&config.lens.catalog)?;

        let ports = discover_devices(&config.serial)?;
        let serial = &config.serial;
        let motion_link = PortLink::open(
            &ports.motion,
            serial.baud_rate,
            millis(serial.motion_timeout_ms),
        )?;
        let light_link = PortLink::open(
            &ports.light,
            serial.baud_rate,
            millis(serial.light_timeout_ms),
        )?;

        Self::assemble(
            config,
            catalog,
            lens_id,
            Box::new(motion_link),
            Box::new(light_link),
            camera,
        )
    }

    /// Build a rig from already opened links. Homes and centers the stage.
    pub fn assemble(
        config: RigConfig,
        catalog: LensCatalog,
        lens_id: &str,
        motion_link: Box<dyn SerialLink>,
        light_link: Box<dyn SerialLink>,
        camera: Box<dyn CameraDevice>,
    ) -> Result<Self> {
        let registry = DeviceRegistry::new();
        let lens = catalog.get(lens_id)?;

        let mut motion = MotionState::new(&registry, motion_link, lens, config.motion.clone())?;
        motion.initialize(config.serial.motion_boot_delay_ms)?;

        let light = LightState::new(&registry, light_link)?;
        settle(config.serial.light_boot_delay_ms);

        let camera = CaptureEngine::new(&registry, camera, config.camera.clone())?;
        log::info!("Rig ready with lens {}", motion.lens().id);

        Ok(Self {
            config,
            catalog,
            motion,
            light,
            camera,
            registry,
        })
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn catalog(&self) -> &LensCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn motion(&mut self) -> &mut MotionState {
        &mut self.motion
    }

    pub fn light(&mut self) -> &mut LightState {
        &mut self.light
    }

    pub fn camera(&self) -> &CaptureEngine {
        &self.camera
    }

    /// Coarse sweep from the lens start height, then fine hill climb.
    pub fn autofocus(&mut self) -> Result<AutofocusReport> {
        AutofocusEngine::new(&mut self.motion, &self.camera, self.config.autofocus.clone())
            .auto_focus()
    }

    /// Fine hill climb around the current height only.
    pub fn fine_focus(&mut self) -> Result<FocusSample> {
        let step = self.config.autofocus.fine_start_step;
        AutofocusEngine::new(&mut self.motion, &self.camera, self.config.autofocus.clone())
            .fine_search(step)
    }

    /// Switch to the catalog entry `id`.
    ///
    /// The stage is lifted to the lens-change height, `swap` runs while the
    /// objective is exchanged, then z returns to the last focus height.
    pub fn change_lens<F>(&mut self, id: &str, swap: F) -> Result<()>
    where
        F: FnOnce(&LensProfile) -> Result<()>,
    {
        let profile = self.catalog.get(id)?;
        self.motion.change_lens(profile)?;
        swap(self.motion.lens())?;
        self.motion.restore_focus()?.require()?;
        log::info!(
            "Lens {} in place, z back at focus {:.3}",
            self.motion.lens().id,
            self.motion.focus_z()
        );
        Ok(())
    }

    /// Focus stack with the configured `focus-stack` executable.
    pub fn focus_stack(&mut self, samples: u32, step: f64) -> Result<FocusStackResult> {
        let merger = FocusStackTool::new(&self.config.tools.focus_stack);
        self.focus_stack_with(&merger, samples, step)
    }

    pub fn focus_stack_with(
        &mut self,
        merger: &dyn FocusMerger,
        samples: u32,
        step: f64,
    ) -> Result<FocusStackResult> {
        FocusStacker::new(&mut self.motion, &self.camera, merger, &self.config)
            .capture_stack(samples, step)
    }

    /// Flat-field corrected photo as JPEG.
    ///
    /// With `n_focus` the photo is a focus stack of that many samples instead
    /// of a single still.
    pub fn color_corrected(&mut self, n_focus: Option<u32>) -> Result<Vec<u8>> {
        let merger = FocusStackTool::new(&self.config.tools.focus_stack);
        self.color_corrected_with(&merger, n_focus)
    }

    pub fn color_corrected_with(
        &mut self,
        merger: &dyn FocusMerger,
        n_focus: Option<u32>,
    ) -> Result<Vec<u8>> {
        let foreground = match n_focus {
            None => image::load_from_memory(&self.camera.get_photo()?)?.to_rgb8(),
            Some(samples) => {
                let step = self.config.focus_stack.step;
                let stack = self.focus_stack_with(merger, samples, step)?;
                image::ImageReader::open(&stack.output)?
                    .with_guessed_format()?
                    .decode()?
                    .to_rgb8()
            }
        };
        let corrected =
            filter::color_correct(&mut self.motion, &self.camera, &self.config, &foreground)?;
        filter::encode_jpeg(&corrected, self.config.filter.jpeg_quality)
    }

    /// Scan request stepping by the mounted lens' field of view.
    pub fn scan_request(&self, fov_x: u32, fov_y: u32, pattern: ScanPattern) -> ScanRequest {
        ScanRequest::for_lens(fov_x, fov_y, pattern, self.motion.lens())
    }

    /// Tile scan with the configured merge and stitch executables.
    pub fn scan(&mut self, request: &ScanRequest) -> Result<ScanOutcome> {
        let tools = &self.config.tools;
        let merger: Arc<dyn FocusMerger> = Arc::new(FocusStackTool::new(&tools.focus_stack));
        let stitcher = XyStitchTool::new(&tools.stitch, &tools.stitch_finalize);
        self.scan_with(merger, &stitcher, request)
    }

    pub fn scan_with(
        &mut self,
        merger: Arc<dyn FocusMerger>,
        stitcher: &dyn TileStitcher,
        request: &ScanRequest,
    ) -> Result<ScanOutcome> {
        ScanOrchestrator::new(
            &mut self.motion,
            &self.camera,
            merger,
            stitcher,
            &self.config,
        )
        .run(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RigError;
    use crate::registry::DeviceKind;
    use crate::testing::{
        fast_config, CopyMerger, RecordingStitcher, ScriptedLink, SimulatedPrinter,
        SyntheticCamera,
    };

    const CATALOG: &str = r#"{
        "20": { "init_pos": 3.0, "step_stitch": 0.45, "step_focus": 0.05 },
        "40": { "init_pos": 3.4, "step_stitch": 0.22, "step_focus": 0.025 }
    }"#;

    fn rig(printer: &SimulatedPrinter, config: RigConfig) -> Rig {
        let light = ScriptedLink::new("sim-light").respond_with(|_| vec!["ok".to_string()]);
        let camera = SyntheticCamera::new(16, 12).tracking(printer).focused_at(3.2);
        Rig::assemble(
            config,
            LensCatalog::from_json(CATALOG).unwrap(),
            "20",
            Box::new(printer.clone()),
            Box::new(light),
            Box::new(camera),
        )
        .unwrap()
    }

    #[test]
    fn test_assemble_boots_stage() {
        let printer = SimulatedPrinter::new();
        let rig = rig(&printer, fast_config());

        assert!(printer.sent().contains(&"G28".to_string()));
        let pos = printer.position();
        assert_eq!((pos.x, pos.y, pos.z), (69.0, 104.0, 3.2));
        for kind in [DeviceKind::Motion, DeviceKind::Light, DeviceKind::Camera] {
            assert!(rig.registry().is_claimed(kind));
        }
    }

    #[test]
    fn test_unknown_lens() {
        let printer = SimulatedPrinter::new();
        let result = Rig::assemble(
            fast_config(),
            LensCatalog::from_json(CATALOG).unwrap(),
            "63",
            Box::new(printer.clone()),
            Box::new(ScriptedLink::new("sim-light")),
            Box::new(SyntheticCamera::new(8, 8)),
        );
        assert!(matches!(result.err(), Some(RigError::UnknownLens(_))));
        assert!(printer.sent().is_empty());
    }

    #[test]
    fn test_change_lens_swaps_at_clearance_then_refocuses() {
        let printer = SimulatedPrinter::new();
        let mut rig = rig(&printer, fast_config());
        rig.motion().set_focus_z(3.42).unwrap();
        let focus_z = rig.motion().focus_z();

        let observer = printer.clone();
        let mut swap_height = None;
        rig.change_lens("40.0", |lens| {
            assert_eq!(lens.id, "40");
            swap_height = Some(observer.position().z);
            Ok(())
        })
        .unwrap();

        assert_eq!(swap_height, Some(20.0));
        assert_eq!(rig.motion().lens().id, "40");
        assert_eq!(rig.motion().z(), focus_z);
        assert!((printer.position().z - focus_z).abs() < 1e-9);
    }

    #[test]
    fn test_change_lens_aborted_swap_stays_raised() {
        let printer = SimulatedPrinter::new();
        let mut rig = rig(&printer, fast_config());

        let err = rig
            .change_lens("40", |_| Err(RigError::InvalidArgument("cancelled".into())))
            .unwrap_err();

        assert!(matches!(err, RigError::InvalidArgument(_)));
        assert_eq!(printer.position().z, 20.0);
    }

    #[test]
    fn test_scan_with_fakes() {
        let root = tempfile::tempdir().unwrap();
        let mut config = fast_config();
        config.scan.root = root.path().join("stitch");

        let printer = SimulatedPrinter::new();
        let mut rig = rig(&printer, config);
        let request = ScanRequest::new(2, 1, ScanPattern::Raster, rig.config());
        let stitcher = RecordingStitcher::new();

        let outcome = rig
            .scan_with(Arc::new(CopyMerger::new()), &stitcher, &request)
            .unwrap();
        assert_eq!(outcome.tiles, vec!["c0000_r0000.tif", "c0001_r0000.tif"]);
        assert!(outcome.stitched.exists());
    }

    #[test]
    fn test_color_corrected_photo() {
        let printer = SimulatedPrinter::new();
        let mut rig = rig(&printer, fast_config());
        let z = printer.position().z;

        let jpeg = rig.color_corrected_with(&CopyMerger::new(), None).unwrap();

        let photo = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((photo.width(), photo.height()), (16, 12));
        assert!(printer.sent().contains(&"G0 Z-0.7".to_string()));
        assert!((printer.position().z - z).abs() < 0.5);
    }

    #[test]
    fn test_color_corrected_focus_stack() {
        let root = tempfile::tempdir().unwrap();
        let mut config = fast_config();
        config.focus_stack.root = root.path().join("fs");

        let printer = SimulatedPrinter::new();
        let mut rig = rig(&printer, config);
        let merger = CopyMerger::new();

        let jpeg = rig.color_corrected_with(&merger, Some(3)).unwrap();

        assert_eq!(merger.calls(), 1);
        assert!(image::load_from_memory(&jpeg).is_ok());
    }

    #[test]
    fn test_scan_request_steps_by_lens_field_of_view() {
        let root = tempfile::tempdir().unwrap();
        let mut config = fast_config();
        config.scan.root = root.path().join("stitch");

        let printer = SimulatedPrinter::new();
        let mut rig = rig(&printer, config);
        let request = rig.scan_request(2, 1, ScanPattern::Boustrophedon);
        assert_eq!(request.step_per_fov, 0.45);

        printer.clear_sent();
        rig.scan_with(Arc::new(CopyMerger::new()), &RecordingStitcher::new(), &request)
            .unwrap();
        assert!(printer.sent().contains(&"G0 X0.45".to_string()));
    }
}
