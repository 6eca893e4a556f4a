use crate::address::{Address, AddressList};

/// SMTP envelope of a message: who it is from and who it goes to.
///
/// A `None` sender is the null reverse-path (`MAIL FROM:<>`).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    sender: Option<Address>,
    recipients: AddressList,
}

impl Envelope {
    #[must_use]
    pub const fn new(sender: Option<Address>, recipients: AddressList) -> Self {
        Self { sender, recipients }
    }

    /// Returns a reference to the [`Envelope`] sender for this message
    #[inline]
    pub const fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    /// Returns a mutable reference to the [`Envelope`] sender for this message
    #[inline]
    pub const fn sender_mut(&mut self) -> &mut Option<Address> {
        &mut self.sender
    }

    /// The sender rendered for storage, empty for the null reverse-path
    #[must_use]
    pub fn mail_from(&self) -> String {
        self.sender.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    /// Returns a reference to the [`Envelope`] recipients, in the order given
    #[inline]
    pub const fn recipients(&self) -> &AddressList {
        &self.recipients
    }
}
