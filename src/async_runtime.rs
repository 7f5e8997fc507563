//! Async runtime integration for Tokio and async-std.
//!
//! Every wait in this crate blocks a thread on a condition variable, and a
//! clocked sender sleeps between frames. These wrappers move those calls onto
//! the runtime's blocking pool with `spawn_blocking` so they never stall the
//! async executor.
//!
//! # Features
//!
//! - `tokio` - Enable Tokio runtime support
//! - `async-std` - Enable async-std runtime support
//!
//! # Example with Tokio
//!
//! ```no_run
//! # #[cfg(feature = "tokio")]
//! # {
//! use std::{sync::Arc, time::Duration};
//! use ndi_framekit::{tokio::AsyncReceiver, LoopbackTransport, Receiver, ReceiverOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ndi_framekit::Error> {
//!     let transport = Arc::new(LoopbackTransport::default());
//!     let receiver = Receiver::new(transport, ReceiverOptions::default())?;
//!     let async_receiver = AsyncReceiver::new(receiver);
//!
//!     // Pull one frame without blocking the runtime
//!     let frame_type = async_receiver.receive(Duration::from_millis(100)).await?;
//!     println!("received {frame_type:?}");
//!     Ok(())
//! }
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use ndarray::Array2;

use crate::{
    framesync::AudioFrameSync,
    receiver::Receiver,
    sender::Sender,
    transport::{FrameType, RecvTransport, SendTransport},
    Result,
};

fn read_audio_window<T: RecvTransport>(
    receiver: &Receiver<T>,
    num_samples: usize,
    timeout: Duration,
) -> Result<Option<(Array2<f32>, i64)>> {
    let audio = receiver.audio_frame();
    if !audio.wait_for_samples(num_samples, timeout) {
        return Ok(None);
    }
    AudioFrameSync::new(audio).get_array_with_timestamp(num_samples)
}

fn read_video<T: RecvTransport>(receiver: &Receiver<T>, timeout: Duration) -> Result<Option<(Vec<u8>, i64)>> {
    let video = receiver.video_frame();
    if !video.wait_for_frame(timeout) {
        return Ok(None);
    }
    video.read_data().map(Some)
}

#[cfg(feature = "tokio")]
pub mod tokio {
    //! Tokio async runtime integration.
    //!
    //! Provides `AsyncReceiver` and `AsyncSender` wrappers that use
    //! `tokio::task::spawn_blocking` for every blocking call.

    use super::*;
    use crate::Error;

    async fn blocking<R, F>(f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        ::tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| Error::InvalidState(format!("blocking task failed: {e}")))?
    }

    /// Async receiver wrapper for Tokio runtime.
    ///
    /// The underlying `Receiver` is wrapped in an `Arc` so clones can be
    /// moved into separate tasks.
    #[derive(Debug)]
    pub struct AsyncReceiver<T: RecvTransport> {
        inner: Arc<Receiver<T>>,
    }

    impl<T: RecvTransport + 'static> AsyncReceiver<T> {
        pub fn new(receiver: Receiver<T>) -> Self {
            Self {
                inner: Arc::new(receiver),
            }
        }

        pub fn from_arc(receiver: Arc<Receiver<T>>) -> Self {
            Self { inner: receiver }
        }

        pub fn receiver(&self) -> &Arc<Receiver<T>> {
            &self.inner
        }

        /// Async version of [`Receiver::receive`].
        pub async fn receive(&self, timeout: Duration) -> Result<FrameType> {
            let receiver = Arc::clone(&self.inner);
            blocking(move || receiver.receive(timeout)).await
        }

        /// Waits for a buffered video frame and pops it.
        ///
        /// Returns `Ok(None)` on timeout.
        pub async fn read_video(&self, timeout: Duration) -> Result<Option<(Vec<u8>, i64)>> {
            let receiver = Arc::clone(&self.inner);
            blocking(move || read_video(&receiver, timeout)).await
        }

        /// Waits for `num_samples` per channel and returns exactly that many
        /// with the first sample's timestamp.
        ///
        /// Returns `Ok(None)` on timeout.
        pub async fn read_audio(
            &self,
            num_samples: usize,
            timeout: Duration,
        ) -> Result<Option<(Array2<f32>, i64)>> {
            let receiver = Arc::clone(&self.inner);
            blocking(move || read_audio_window(&receiver, num_samples, timeout)).await
        }
    }

    impl<T: RecvTransport> Clone for AsyncReceiver<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    /// Async sender wrapper for Tokio runtime.
    ///
    /// Clocked writes sleep on the blocking pool instead of the executor.
    #[derive(Debug)]
    pub struct AsyncSender<T: SendTransport> {
        inner: Arc<Sender<T>>,
    }

    impl<T: SendTransport + 'static> AsyncSender<T> {
        pub fn new(sender: Sender<T>) -> Self {
            Self {
                inner: Arc::new(sender),
            }
        }

        pub fn sender(&self) -> &Arc<Sender<T>> {
            &self.inner
        }

        /// Async version of [`Sender::write_video`].
        pub async fn write_video(&self, data: Vec<u8>, timestamp: i64) -> Result<()> {
            let sender = Arc::clone(&self.inner);
            blocking(move || sender.write_video(&data, timestamp)).await
        }

        /// Async version of [`Sender::write_audio`].
        pub async fn write_audio(&self, samples: Array2<f32>, timestamp: i64) -> Result<()> {
            let sender = Arc::clone(&self.inner);
            blocking(move || sender.write_audio(samples.view(), timestamp)).await
        }

        /// Waits until the pending video slot has been released.
        pub async fn wait_video_complete(&self, timeout: Duration) -> Result<bool> {
            let sender = Arc::clone(&self.inner);
            blocking(move || Ok(sender.video_frame().wait_send_complete(timeout))).await
        }
    }

    impl<T: SendTransport> Clone for AsyncSender<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }
}

#[cfg(feature = "async-std")]
pub mod async_std {
    //! async-std runtime integration.
    //!
    //! Provides `AsyncReceiver` and `AsyncSender` wrappers that use
    //! `async_std::task::spawn_blocking` for every blocking call.

    use super::*;

    #[derive(Debug)]
    pub struct AsyncReceiver<T: RecvTransport> {
        inner: Arc<Receiver<T>>,
    }

    impl<T: RecvTransport + 'static> AsyncReceiver<T> {
        pub fn new(receiver: Receiver<T>) -> Self {
            Self {
                inner: Arc::new(receiver),
            }
        }

        pub fn from_arc(receiver: Arc<Receiver<T>>) -> Self {
            Self { inner: receiver }
        }

        pub fn receiver(&self) -> &Arc<Receiver<T>> {
            &self.inner
        }

        pub async fn receive(&self, timeout: Duration) -> Result<FrameType> {
            let receiver = Arc::clone(&self.inner);
            ::async_std::task::spawn_blocking(move || receiver.receive(timeout)).await
        }

        pub async fn read_video(&self, timeout: Duration) -> Result<Option<(Vec<u8>, i64)>> {
            let receiver = Arc::clone(&self.inner);
            ::async_std::task::spawn_blocking(move || read_video(&receiver, timeout)).await
        }

        pub async fn read_audio(
            &self,
            num_samples: usize,
            timeout: Duration,
        ) -> Result<Option<(Array2<f32>, i64)>> {
            let receiver = Arc::clone(&self.inner);
            ::async_std::task::spawn_blocking(move || {
                read_audio_window(&receiver, num_samples, timeout)
            })
            .await
        }
    }

    impl<T: RecvTransport> Clone for AsyncReceiver<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    #[derive(Debug)]
    pub struct AsyncSender<T: SendTransport> {
        inner: Arc<Sender<T>>,
    }

    impl<T: SendTransport + 'static> AsyncSender<T> {
        pub fn new(sender: Sender<T>) -> Self {
            Self {
                inner: Arc::new(sender),
            }
        }

        pub fn sender(&self) -> &Arc<Sender<T>> {
            &self.inner
        }

        pub async fn write_video(&self, data: Vec<u8>, timestamp: i64) -> Result<()> {
            let sender = Arc::clone(&self.inner);
            ::async_std::task::spawn_blocking(move || sender.write_video(&data, timestamp)).await
        }

        pub async fn write_audio(&self, samples: Array2<f32>, timestamp: i64) -> Result<()> {
            let sender = Arc::clone(&self.inner);
            ::async_std::task::spawn_blocking(move || sender.write_audio(samples.view(), timestamp))
                .await
        }

        pub async fn wait_video_complete(&self, timeout: Duration) -> bool {
            let sender = Arc::clone(&self.inner);
            ::async_std::task::spawn_blocking(move || {
                sender.video_frame().wait_send_complete(timeout)
            })
            .await
        }
    }

    impl<T: SendTransport> Clone for AsyncSender<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }
}
