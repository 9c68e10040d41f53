//! virtio-gpu 2D driver: display discovery, a single linear resource backing
//! the framebuffer, and the transfer/flush round trips that push pixels to
//! the host.

use super::mmio::MmioTransport;
use super::queue::{ChainEntry, VirtQueue};
use crate::error::DriverError;
use crate::mm::bump;
use core::mem::size_of;

const VIRTIO_DEVICE_ID_GPU: u32 = 16;
const VIRTIO_F_VERSION_1: u64 = 1 << 32;

const CMD_GET_DISPLAY_INFO: u32 = 0x0100;
const CMD_RESOURCE_CREATE_2D: u32 = 0x0101;
#[allow(dead_code)]
const CMD_RESOURCE_UNREF: u32 = 0x0102;
const CMD_SET_SCANOUT: u32 = 0x0103;
const CMD_RESOURCE_FLUSH: u32 = 0x0104;
const CMD_TRANSFER_TO_HOST_2D: u32 = 0x0105;
const CMD_RESOURCE_ATTACH_BACKING: u32 = 0x0106;
#[allow(dead_code)]
const CMD_RESOURCE_DETACH_BACKING: u32 = 0x0107;

const RESP_OK_NODATA: u32 = 0x1100;
const RESP_OK_DISPLAY_INFO: u32 = 0x1101;

/// `VIRTIO_GPU_FORMAT_B8G8R8X8_UNORM`. Chosen so a little-endian `u32` pixel
/// value written as `0x00RRGGBB` lands in memory as the bytes `B, G, R, X`
/// that this format expects — no byte-swapping needed between the console's
/// palette and the wire format.
const FORMAT_B8G8R8X8_UNORM: u32 = 2;

const RESOURCE_ID: u32 = 1;
const SCANOUT_ID: u32 = 0;
const QUEUE_SIZE: u16 = 16;
const SPIN_LIMIT: u32 = 10_000_000;

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct CommandHeader {
    command_type: u32,
    flags: u32,
    fence_id: u64,
    context_id: u32,
    padding: u32,
}

impl CommandHeader {
    fn new(command_type: u32) -> Self {
        Self {
            command_type,
            ..Default::default()
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct Rect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct DisplayModeInfo {
    rect: Rect,
    enabled: u32,
    flags: u32,
}

#[repr(C)]
struct DisplayInfoResponse {
    header: CommandHeader,
    pmodes: [DisplayModeInfo; 16],
}

#[repr(C)]
struct ResourceCreate2d {
    header: CommandHeader,
    resource_id: u32,
    format: u32,
    width: u32,
    height: u32,
}

#[repr(C)]
struct MemoryEntry {
    address: u64,
    length: u32,
    padding: u32,
}

#[repr(C)]
struct AttachBacking {
    header: CommandHeader,
    resource_id: u32,
    entry_count: u32,
    entry: MemoryEntry,
}

#[repr(C)]
struct ScanoutInfo {
    header: CommandHeader,
    rect: Rect,
    scanout_id: u32,
    resource_id: u32,
}

#[repr(C)]
struct TransferToHost2d {
    header: CommandHeader,
    rect: Rect,
    offset: u64,
    resource_id: u32,
    padding: u32,
}

#[repr(C)]
struct ResourceFlush {
    header: CommandHeader,
    rect: Rect,
    resource_id: u32,
    padding: u32,
}

#[repr(C)]
struct ResponseHeaderOnly {
    header: CommandHeader,
}

pub struct GpuDevice {
    transport: MmioTransport,
    queue: VirtQueue,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    framebuffer: *mut u8,
}

// SAFETY: touched only from the single-hart polling loop.
unsafe impl Send for GpuDevice {}

impl GpuDevice {
    pub fn init() -> Result<Self, DriverError> {
        let transport = MmioTransport::find_device(VIRTIO_DEVICE_ID_GPU)
            .ok_or(DriverError::DeviceNotFound { device_id: VIRTIO_DEVICE_ID_GPU })?;
        transport.reset_and_acknowledge();
        transport.negotiate(VIRTIO_F_VERSION_1)?;
        let mut queue = transport
            .setup_queue(0, QUEUE_SIZE)
            .ok_or(DriverError::OutOfMemory)?;
        transport.set_driver_ok();

        let (width, height) = Self::get_display_info(&transport, &mut queue)?;
        let stride = width * 4;

        let fb_bytes = (stride as usize) * (height as usize);
        let framebuffer = bump::allocate_aligned(fb_bytes, 4096);
        if framebuffer.is_null() {
            return Err(DriverError::OutOfMemory);
        }
        // SAFETY: `framebuffer` was just allocated at exactly `fb_bytes`.
        unsafe { core::ptr::write_bytes(framebuffer, 0, fb_bytes) };

        let mut device = Self {
            transport,
            queue,
            width,
            height,
            stride,
            framebuffer,
        };

        device.create_resource()?;
        device.attach_backing(fb_bytes)?;
        device.set_scanout()?;
        device.flush_rect(0, 0, width, height)?;
        Ok(device)
    }

    pub fn framebuffer_ptr(&self) -> *mut u8 {
        self.framebuffer
    }

    fn get_display_info(
        transport: &MmioTransport,
        queue: &mut VirtQueue,
    ) -> Result<(u32, u32), DriverError> {
        let request = CommandHeader::new(CMD_GET_DISPLAY_INFO);
        let mut response = DisplayInfoResponse {
            header: CommandHeader::default(),
            pmodes: [DisplayModeInfo::default(); 16],
        };
        if !send(transport, queue, &request, &mut response) {
            return Err(DriverError::CommandTimedOut);
        }
        if response.header.command_type != RESP_OK_DISPLAY_INFO {
            return Err(DriverError::NoActiveDisplay);
        }
        let mode = &response.pmodes[SCANOUT_ID as usize];
        if mode.enabled == 0 {
            return Err(DriverError::NoActiveDisplay);
        }
        Ok((mode.rect.width, mode.rect.height))
    }

    fn create_resource(&mut self) -> Result<(), DriverError> {
        let request = ResourceCreate2d {
            header: CommandHeader::new(CMD_RESOURCE_CREATE_2D),
            resource_id: RESOURCE_ID,
            format: FORMAT_B8G8R8X8_UNORM,
            width: self.width,
            height: self.height,
        };
        self.expect_ok_nodata(&request)
    }

    fn attach_backing(&mut self, fb_bytes: usize) -> Result<(), DriverError> {
        let request = AttachBacking {
            header: CommandHeader::new(CMD_RESOURCE_ATTACH_BACKING),
            resource_id: RESOURCE_ID,
            entry_count: 1,
            entry: MemoryEntry {
                address: self.framebuffer as usize as u64,
                length: fb_bytes as u32,
                padding: 0,
            },
        };
        self.expect_ok_nodata(&request)
    }

    fn set_scanout(&mut self) -> Result<(), DriverError> {
        let request = ScanoutInfo {
            header: CommandHeader::new(CMD_SET_SCANOUT),
            rect: Rect { x: 0, y: 0, width: self.width, height: self.height },
            scanout_id: SCANOUT_ID,
            resource_id: RESOURCE_ID,
        };
        self.expect_ok_nodata(&request)
    }

    /// Push a dirty rectangle to the host: a transfer-to-host round trip
    /// followed by a flush, both clipped to the framebuffer bounds.
    pub fn flush_rect(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<(), DriverError> {
        let x = x.min(self.width);
        let y = y.min(self.height);
        let width = width.min(self.width - x);
        let height = height.min(self.height - y);
        if width == 0 || height == 0 {
            return Ok(());
        }
        let rect = Rect { x, y, width, height };

        let transfer = TransferToHost2d {
            header: CommandHeader::new(CMD_TRANSFER_TO_HOST_2D),
            rect,
            offset: (y as u64) * (self.stride as u64) + (x as u64) * 4,
            resource_id: RESOURCE_ID,
            padding: 0,
        };
        self.expect_ok_nodata(&transfer)?;

        let flush = ResourceFlush {
            header: CommandHeader::new(CMD_RESOURCE_FLUSH),
            rect,
            resource_id: RESOURCE_ID,
            padding: 0,
        };
        self.expect_ok_nodata(&flush)
    }

    fn expect_ok_nodata<Req>(&mut self, request: &Req) -> Result<(), DriverError> {
        let mut response = ResponseHeaderOnly { header: CommandHeader::default() };
        if !send(&self.transport, &mut self.queue, request, &mut response) {
            return Err(DriverError::CommandTimedOut);
        }
        if response.header.command_type != RESP_OK_NODATA {
            return Err(DriverError::CommandTimedOut);
        }
        Ok(())
    }
}

fn send<Req, Resp>(
    transport: &MmioTransport,
    queue: &mut VirtQueue,
    request: &Req,
    response: &mut Resp,
) -> bool {
    let entries = [
        ChainEntry {
            address: request as *const Req as usize as u64,
            length: size_of::<Req>() as u32,
            device_writable: false,
        },
        ChainEntry {
            address: response as *mut Resp as usize as u64,
            length: size_of::<Resp>() as u32,
            device_writable: true,
        },
    ];
    let head = match queue.alloc_chain(&entries) {
        Some(head) => head,
        None => return false,
    };
    queue.submit(head);
    transport.notify_queue(queue.queue_index);

    for _ in 0..SPIN_LIMIT {
        if queue.poll_used().is_some() {
            queue.free_chain(head);
            return true;
        }
        core::hint::spin_loop();
    }
    queue.free_chain(head);
    false
}
