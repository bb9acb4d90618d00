//! Pagination driver

use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use super::Browser;
use crate::http::Request;
use crate::Result;

/// What a pagination routine produces
#[derive(Debug)]
pub enum Step<T> {
    /// An item of the sequence
    Yielded(T),
    /// Navigate here, then run the routine again
    Redirect(Request),
    /// No more items
    Done,
}

impl<T> Step<T> {
    pub fn redirect<R: Into<Request>>(request: R) -> Self {
        Step::Redirect(request.into())
    }
}

type Steps<T> = Box<dyn Iterator<Item = Step<T>> + Send>;
type Routine<T> = Box<dyn FnMut(&Browser) -> Result<Steps<T>> + Send>;

/// Runs a routine against the current page, following its redirect signals
///
/// The routine is called with the browser; it reads the current page and
/// returns the steps for that page. A [`Step::Redirect`] abandons the
/// remaining steps, navigates, and calls the routine again. The sequence ends
/// on [`Step::Done`] or when the steps run out without a redirect.
pub struct Pagination<T> {
    browser: Browser,
    routine: Routine<T>,
    steps: Option<Steps<T>>,
    finished: bool,
}

impl Browser {
    pub fn pagination<T, F, I>(&self, mut routine: F) -> Pagination<T>
    where
        T: Send + 'static,
        F: FnMut(&Browser) -> Result<I> + Send + 'static,
        I: IntoIterator<Item = Step<T>>,
        I::IntoIter: Send + 'static,
    {
        let routine: Routine<T> = Box::new(move |browser: &Browser| {
            routine(browser).map(|steps| Box::new(steps.into_iter()) as Steps<T>)
        });
        Pagination {
            browser: self.clone(),
            routine,
            steps: None,
            finished: false,
        }
    }
}

impl<T: Send + 'static> Pagination<T> {
    /// Next item, `None` once the routine is done
    ///
    /// An error ends the sequence.
    pub async fn next_item(&mut self) -> Option<Result<T>> {
        loop {
            if self.finished {
                return None;
            }

            if self.steps.is_none() {
                match (self.routine)(&self.browser) {
                    Ok(steps) => self.steps = Some(steps),
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }

            match self.steps.as_mut().and_then(|steps| steps.next()) {
                Some(Step::Yielded(item)) => return Some(Ok(item)),
                Some(Step::Redirect(request)) => {
                    self.steps = None;
                    debug!("Pagination continues on {}", request.url);
                    if let Err(e) = self.browser.location(request).await {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
                Some(Step::Done) | None => {
                    self.steps = None;
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Drain every item, stopping at the first error
    pub async fn collect_items(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item().await {
            items.push(item?);
        }
        Ok(items)
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<T>> {
        stream::unfold(self, |mut pagination| async move {
            pagination
                .next_item()
                .await
                .map(|item| (item, pagination))
        })
        .boxed()
    }
}
