//! User-facing subscription handle with a copy-on-write image set

use std::sync::{
    atomic::{AtomicBool, AtomicPtr, Ordering},
    Arc,
};

use super::image::Image;

/// The immutable image set; swapped whole on every membership change
pub type ImageArray = Vec<Arc<Image>>;

/// A subscription to a channel/stream, holding one [`Image`] per remote
/// publisher session feeding the stream.
///
/// The image set is an immutable array behind an atomic pointer: the
/// conductor (the only mutator, serialized by its admin lock) swaps in a new
/// array on add/remove and hands the replaced array back for deferred
/// reclamation, while user threads read the current array lock-free. Replaced
/// arrays stay valid for at least the resource linger timeout, which bounds
/// how long a reader may observe a stale snapshot.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    registration_id: i64,
    stream_id: i32,
    images: AtomicPtr<ImageArray>,
    closed: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(channel: String, registration_id: i64, stream_id: i32) -> Self {
        Self {
            channel,
            registration_id,
            stream_id,
            images: AtomicPtr::new(Box::into_raw(Box::new(Vec::new()))),
            closed: AtomicBool::new(false),
        }
    }

    /// Channel URI this subscription was added with
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Registration id issued when the subscription was added
    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    /// Stream id within the channel
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    /// Whether an image with the given correlation id is currently held
    pub fn has_image(&self, correlation_id: i64) -> bool {
        self.images()
            .iter()
            .any(|image| image.correlation_id() == correlation_id)
    }

    /// Number of images currently feeding this subscription
    pub fn image_count(&self) -> usize {
        self.images().len()
    }

    /// Visit every current image
    pub fn for_each_image<F: FnMut(&Arc<Image>)>(&self, mut f: F) {
        for image in self.images() {
            f(image);
        }
    }

    /// Whether the subscription has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Add an image, returning the replaced array for lingering.
    ///
    /// Conductor only; calls are serialized by the admin lock.
    pub(crate) fn add_image(&self, image: Arc<Image>) -> Box<ImageArray> {
        let old = self.images();
        let mut new_array = Vec::with_capacity(old.len() + 1);
        new_array.extend(old.iter().cloned());
        new_array.push(image);

        self.swap_images(new_array)
    }

    /// Remove the image with the given correlation id, returning it together
    /// with the replaced array for lingering.
    ///
    /// Conductor only; calls are serialized by the admin lock.
    pub(crate) fn remove_image(&self, correlation_id: i64) -> Option<(Arc<Image>, Box<ImageArray>)> {
        let old = self.images();
        let index = old
            .iter()
            .position(|image| image.correlation_id() == correlation_id)?;

        let removed = Arc::clone(&old[index]);
        let mut new_array = Vec::with_capacity(old.len() - 1);
        new_array.extend(old.iter().enumerate().filter(|(i, _)| *i != index).map(|(_, v)| v.clone()));

        Some((removed, self.swap_images(new_array)))
    }

    /// Swap in an empty image set, returning the current images and the
    /// replaced array for lingering.
    ///
    /// Conductor only; calls are serialized by the admin lock.
    pub(crate) fn take_images(&self) -> (Vec<Arc<Image>>, Box<ImageArray>) {
        let images = self.images().to_vec();
        let old = self.swap_images(Vec::new());
        (images, old)
    }

    fn images(&self) -> &ImageArray {
        // Replaced arrays outlive readers through the linger list.
        unsafe { &*self.images.load(Ordering::Acquire) }
    }

    fn swap_images(&self, new_array: ImageArray) -> Box<ImageArray> {
        let old = self
            .images
            .swap(Box::into_raw(Box::new(new_array)), Ordering::AcqRel);
        unsafe { Box::from_raw(old) }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let images = self.images.load(Ordering::Acquire);
        if !images.is_null() {
            unsafe { drop(Box::from_raw(images)) };
        }
    }
}

unsafe impl Send for Subscription {}
unsafe impl Sync for Subscription {}
