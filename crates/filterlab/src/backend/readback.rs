//! Timestamp query pools and their readback

use crate::{Error, Result};

/// Bytes per resolved timestamp
const TIMESTAMP_SIZE: u64 = std::mem::size_of::<u64>() as u64;

/// A timestamp query set with its resolve and staging buffers
#[derive(Debug)]
pub(crate) struct QueryPool {
    pub set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    staging: wgpu::Buffer,
    count: u32,
    /// Slots resolved by the last submission
    resolved: u32,
}

impl QueryPool {
    pub fn new(device: &wgpu::Device, count: u32) -> Self {
        let set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("timestamp queries"),
            ty: wgpu::QueryType::Timestamp,
            count,
        });
        let size = u64::from(count) * TIMESTAMP_SIZE;
        let resolve = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timestamp resolve buffer"),
            size,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timestamp staging buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            set,
            resolve,
            staging,
            count,
            resolved: 0,
        }
    }

    /// Resolves the first `written` slots and copies them to the staging buffer
    pub fn encode_resolve(&mut self, encoder: &mut wgpu::CommandEncoder, written: u32) {
        let written = written.min(self.count);
        if written == 0 {
            return;
        }
        let size = u64::from(written) * TIMESTAMP_SIZE;
        encoder.resolve_query_set(&self.set, 0..written, &self.resolve, 0);
        encoder.copy_buffer_to_buffer(&self.resolve, 0, &self.staging, 0, size);
        self.resolved = written;
    }

    /// Waits for the device and reads the first `count` resolved timestamps
    pub fn read(&self, device: &wgpu::Device, count: u32) -> Result<Vec<u64>> {
        if count > self.resolved {
            return Err(Error::QuerySlotMismatch {
                written: self.resolved,
                expected: count,
            });
        }

        let slice = self.staging.slice(0..u64::from(count) * TIMESTAMP_SIZE);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| Error::Device(format!("Failed to wait for timestamps: {e}")))?;

        match pollster::block_on(receiver.receive()) {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(Error::Device(format!("Failed to map timestamp buffer: {e}"))),
            None => return Err(Error::Device("Timestamp mapping was cancelled".to_string())),
        }

        let timestamps = {
            let data = slice.get_mapped_range();
            bytemuck::try_cast_slice::<u8, u64>(&data)
                .map(<[u64]>::to_vec)
                .map_err(|e| Error::Device(format!("Misaligned timestamp data: {e}")))
        };
        self.staging.unmap();
        timestamps
    }
}
