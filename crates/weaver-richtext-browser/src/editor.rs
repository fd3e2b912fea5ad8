//! A session attached to a contenteditable element.

use std::cell::RefCell;
use std::rc::Rc;

use miette::Diagnostic;
use weaver_richtext_core::{EditorConfig, EditorError, Plugin, Session};

use crate::events::{self, BeforeInputContext, BeforeInputResult};
use crate::mirror::{DomMirror, MirrorListener};
use crate::selection::BrowserSelection;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum BrowserError {
    #[error("editor element is not attached to a document")]
    #[diagnostic(code(weaver::browser::detached_root))]
    DetachedRoot,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Editor(#[from] EditorError),
}

/// Owns the session and the DOM mirror it drives.
///
/// The element's current markup becomes the initial content; from then on
/// the arena is authoritative and the element only mirrors it.
pub struct BrowserEditor {
    session: Session,
    mirror: Rc<RefCell<DomMirror>>,
}

impl std::fmt::Debug for BrowserEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserEditor")
            .field("session", &self.session)
            .field("mirror", &self.mirror)
            .finish()
    }
}

impl BrowserEditor {
    pub fn attach(
        root: web_sys::HtmlElement,
        config: EditorConfig,
        plugins: &[Box<dyn Plugin>],
    ) -> Result<Self, BrowserError> {
        let initial = root.inner_html();
        root.set_content_editable("true");
        let element: web_sys::Element = root.into();
        let mirror = DomMirror::for_element(element).ok_or(BrowserError::DetachedRoot)?;
        let mirror = Rc::new(RefCell::new(mirror));

        let platform = BrowserSelection::new(Rc::clone(&mirror));
        let mut session = Session::new(config, plugins, Box::new(platform))?;
        session.add_listener(Box::new(MirrorListener(Rc::clone(&mirror))));
        session.reset_content(&initial)?;
        tracing::info!(
            target: "weaver::dom",
            nodes = mirror.borrow().len(),
            "attached editor"
        );
        Ok(Self { session, mirror })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn mirror(&self) -> &Rc<RefCell<DomMirror>> {
        &self.mirror
    }

    /// Returns whether a keybinding handled the event.
    pub fn handle_keydown(&mut self, event: &web_sys::KeyboardEvent) -> Result<bool, EditorError> {
        events::handle_keydown(&mut self.session, event)
    }

    /// Run the command for a beforeinput event, preventing the browser's own
    /// edit when it was handled.
    pub fn handle_beforeinput(
        &mut self,
        event: &web_sys::InputEvent,
    ) -> Result<BeforeInputResult, EditorError> {
        let ctx = BeforeInputContext::from_event(event, &self.mirror.borrow());
        let result = events::handle_beforeinput(&mut self.session, &ctx)?;
        if result == BeforeInputResult::Handled {
            event.prevent_default();
        }
        Ok(result)
    }

    /// Adopt text the browser typed into a mirrored text node on its own
    /// (composition end, spellcheck replacements) as one undo step.
    pub fn observe_text_input(&mut self, node: &web_sys::Node) -> Result<(), EditorError> {
        let mutation = self.mirror.borrow().external_text(node);
        self.session.observe_external(mutation)?;
        self.session.close_step()?;
        Ok(())
    }

    pub fn content_html(&self) -> Result<String, EditorError> {
        self.session.content_html()
    }
}
