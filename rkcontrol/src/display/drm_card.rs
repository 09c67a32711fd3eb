//! Linux DRM/KMS backend.
//!
//! Legacy modesetting: `set_crtc` programs the mode once, then frames are
//! presented with page flips. Surfaces are dumb buffers wrapped in
//! framebuffers.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

use drm::Device as _;
use drm::buffer::DrmFourcc;
use drm::control::{
    Device as ControlDevice, Mode, ModeTypeFlags, PageFlipFlags, connector, crtc,
    dumbbuffer::DumbBuffer, framebuffer,
};
use tracing::{debug, warn};

use crate::display::device::{DisplayDevice, ModeInfo, OutputInfo, ScanoutConfig, SurfaceId};
use crate::errors::{KioskError, Result};

const DRI_DIR: &str = "/dev/dri";

struct Connector {
    handle: connector::Handle,
    crtc: Option<crtc::Handle>,
    modes: Vec<Mode>,
}

pub struct DrmCard {
    file: File,
    path: PathBuf,
    connectors: Vec<Connector>,
    saved: Option<crtc::Info>,
    surfaces: HashMap<u32, (DumbBuffer, framebuffer::Handle)>,
    next_surface: u32,
}

impl AsFd for DrmCard {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl drm::Device for DrmCard {}
impl ControlDevice for DrmCard {}

impl DrmCard {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            connectors: Vec::new(),
            saved: None,
            surfaces: HashMap::new(),
            next_surface: 0,
        })
    }

    /// Opens `hint` alone, or every `/dev/dri/card*` in name order.
    pub fn enumerate(hint: Option<&Path>) -> Vec<DrmCard> {
        let paths = match hint {
            Some(path) => vec![path.to_path_buf()],
            None => {
                let mut paths: Vec<PathBuf> = fs::read_dir(DRI_DIR)
                    .map(|entries| {
                        entries
                            .flatten()
                            .map(|e| e.path())
                            .filter(|p| {
                                p.file_name()
                                    .map(|n| n.to_string_lossy().starts_with("card"))
                                    .unwrap_or(false)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                paths.sort();
                paths
            }
        };

        paths
            .into_iter()
            .filter_map(|path| match DrmCard::open(&path) {
                Ok(card) => Some(card),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Cannot open DRM device");
                    None
                }
            })
            .collect()
    }

    fn connector(&self, output: &OutputInfo) -> Result<&Connector> {
        self.connectors
            .get(output.id as usize)
            .ok_or_else(|| KioskError::resource_unavailable(format!("unknown output {}", output.name)))
    }

    fn crtc_for(&self, output: &OutputInfo) -> Result<(connector::Handle, crtc::Handle)> {
        let connector = self.connector(output)?;
        let crtc = connector
            .crtc
            .ok_or_else(|| KioskError::resource_unavailable(format!("no CRTC for {}", output.name)))?;
        Ok((connector.handle, crtc))
    }

    /// CRTC driving `info`: the one of its current encoder, or the first
    /// one any of its encoders can use.
    fn pick_crtc(&self, info: &connector::Info) -> Option<crtc::Handle> {
        if let Some(crtc) = info
            .current_encoder()
            .and_then(|enc| self.get_encoder(enc).ok())
            .and_then(|enc| enc.crtc())
        {
            return Some(crtc);
        }
        let resources = self.resource_handles().ok()?;
        info.encoders()
            .iter()
            .filter_map(|enc| self.get_encoder(*enc).ok())
            .flat_map(|enc| resources.filter_crtcs(enc.possible_crtcs()))
            .next()
    }
}

fn mode_info(mode: &Mode) -> ModeInfo {
    let (width, height) = mode.size();
    ModeInfo {
        name: mode.name().to_string_lossy().into_owned(),
        width: u32::from(width),
        height: u32::from(height),
        refresh: mode.vrefresh(),
        preferred: mode.mode_type().contains(ModeTypeFlags::PREFERRED),
    }
}

impl DisplayDevice for DrmCard {
    fn path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }

    fn name(&self) -> String {
        match self.get_driver() {
            Ok(driver) => format!("{} ({})", self.path.display(), driver.name().to_string_lossy()),
            Err(_) => self.path.display().to_string(),
        }
    }

    fn outputs(&mut self) -> Result<Vec<OutputInfo>> {
        let resources = self.resource_handles()?;
        let mut connectors = Vec::new();
        let mut outputs = Vec::new();

        for handle in resources.connectors() {
            let info = match self.get_connector(*handle, true) {
                Ok(info) => info,
                Err(err) => {
                    debug!(error = %err, "Skipping unreadable connector");
                    continue;
                }
            };
            let modes = info.modes().to_vec();
            outputs.push(OutputInfo {
                id: connectors.len() as u32,
                // Nom noyau (HDMI-A-1), celui qu'attend mpv
                name: format!("{}-{}", info.interface().as_str(), info.interface_id()),
                connected: info.state() == connector::State::Connected,
                modes: modes.iter().map(mode_info).collect(),
            });
            connectors.push(Connector {
                handle: *handle,
                crtc: self.pick_crtc(&info),
                modes,
            });
        }

        self.connectors = connectors;
        Ok(outputs)
    }

    fn save_scanout(&mut self, output: &OutputInfo) -> Result<Option<ScanoutConfig>> {
        let (_, crtc) = self.crtc_for(output)?;
        let info = self.get_crtc(crtc)?;
        let config = ScanoutConfig {
            output: output.id,
            mode: info.mode().as_ref().map(mode_info),
        };
        self.saved = Some(info);
        Ok(Some(config))
    }

    fn restore_scanout(&mut self, output: &OutputInfo, _saved: &ScanoutConfig) -> Result<()> {
        let (connector, _) = self.crtc_for(output)?;
        let Some(saved) = self.saved.as_ref() else {
            return Ok(());
        };
        let single = [connector];
        let connectors: &[connector::Handle] = if saved.mode().is_some() { &single } else { &[] };
        self.set_crtc(
            saved.handle(),
            saved.framebuffer(),
            saved.position(),
            connectors,
            saved.mode(),
        )?;
        Ok(())
    }

    fn disable_scanout(&mut self, output: &OutputInfo) -> Result<()> {
        let (_, crtc) = self.crtc_for(output)?;
        self.set_crtc(crtc, None, (0, 0), &[], None)?;
        Ok(())
    }

    fn create_surface(&mut self, width: u32, height: u32) -> Result<SurfaceId> {
        let buffer = self.create_dumb_buffer((width, height), DrmFourcc::Xrgb8888, 32)?;
        let framebuffer = match self.add_framebuffer(&buffer, 24, 32) {
            Ok(fb) => fb,
            Err(err) => {
                if let Err(cleanup) = self.destroy_dumb_buffer(buffer) {
                    debug!(error = %cleanup, "destroy_dumb_buffer failed");
                }
                return Err(err.into());
            }
        };
        self.next_surface += 1;
        let id = SurfaceId(self.next_surface);
        self.surfaces.insert(id.0, (buffer, framebuffer));
        Ok(id)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        if let Some((buffer, framebuffer)) = self.surfaces.remove(&surface.0) {
            if let Err(err) = self.destroy_framebuffer(framebuffer) {
                debug!(error = %err, "destroy_framebuffer failed");
            }
            if let Err(err) = self.destroy_dumb_buffer(buffer) {
                debug!(error = %err, "destroy_dumb_buffer failed");
            }
        }
    }

    fn modeset(&mut self, output: &OutputInfo, mode: &ModeInfo, surface: SurfaceId) -> Result<()> {
        let connector = self.connector(output)?;
        let native = connector
            .modes
            .iter()
            .find(|m| mode_info(m) == *mode)
            .cloned()
            .ok_or_else(|| KioskError::configuration(format!("mode {mode} not on {}", output.name)))?;
        let (connector, crtc) = self.crtc_for(output)?;
        let (_, framebuffer) = self
            .surfaces
            .get(&surface.0)
            .ok_or_else(|| KioskError::resource_unavailable("unknown surface"))?;
        self.set_crtc(crtc, Some(*framebuffer), (0, 0), &[connector], Some(native))?;
        Ok(())
    }

    fn flip(&mut self, output: &OutputInfo, surface: SurfaceId) -> Result<bool> {
        let (_, crtc) = self.crtc_for(output)?;
        let framebuffer = self
            .surfaces
            .get(&surface.0)
            .map(|(_, fb)| *fb)
            .ok_or_else(|| KioskError::resource_unavailable("unknown surface"))?;
        match self.page_flip(crtc, framebuffer, PageFlipFlags::empty(), None) {
            Ok(()) => Ok(true),
            Err(err) if err.raw_os_error() == Some(libc::EBUSY) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn set_master(&mut self) -> Result<()> {
        self.acquire_master_lock()?;
        Ok(())
    }

    fn drop_master(&mut self) -> Result<()> {
        self.release_master_lock()?;
        Ok(())
    }
}
