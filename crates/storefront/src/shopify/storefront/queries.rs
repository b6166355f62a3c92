//! GraphQL documents for Shopify Storefront API cart operations.
//!
//! Every mutation aliases its root field to `result` and selects the shared
//! `CartFields` fragment, so all of them decode into
//! [`CartMutationData`](crate::shopify::types::CartMutationData).

/// Cart selection shared by the query and every mutation.
macro_rules! cart_fields {
    () => {
        r"
fragment CartFields on Cart {
  id
  checkoutUrl
  updatedAt
  totalQuantity
  cost {
    subtotalAmount { amount currencyCode }
    totalAmount { amount currencyCode }
  }
  lines(first: 100) {
    nodes {
      id
      quantity
      cost {
        amountPerQuantity { amount currencyCode }
        subtotalAmount { amount currencyCode }
        totalAmount { amount currencyCode }
      }
      merchandise {
        ... on ProductVariant {
          id
          title
          selectedOptions { name value }
          image { url altText }
          product { handle title }
        }
      }
    }
  }
  discountCodes { code applicable }
  appliedGiftCards {
    id
    lastCharacters
    amountUsed { amount currencyCode }
  }
}
"
    };
}

/// Mutation document: `$operation` aliased to `result`, returning the cart and
/// user errors.
macro_rules! cart_mutation {
    ($signature:literal, $field:literal) => {
        concat!(
            "mutation ",
            $signature,
            " {\n  result: ",
            $field,
            " {\n    cart { ...CartFields }\n    userErrors { field message code }\n  }\n}\n",
            cart_fields!()
        )
    };
}

pub const GET_CART_OPERATION: &str = "GetCart";
pub const GET_CART: &str = concat!(
    "query GetCart($cartId: ID!) {\n  cart(id: $cartId) { ...CartFields }\n}\n",
    cart_fields!()
);

pub const CART_CREATE_OPERATION: &str = "CartCreate";
pub const CART_CREATE: &str = cart_mutation!(
    "CartCreate($input: CartInput!)",
    "cartCreate(input: $input)"
);

pub const CART_LINES_ADD_OPERATION: &str = "CartLinesAdd";
pub const CART_LINES_ADD: &str = cart_mutation!(
    "CartLinesAdd($cartId: ID!, $lines: [CartLineInput!]!)",
    "cartLinesAdd(cartId: $cartId, lines: $lines)"
);

pub const CART_LINES_UPDATE_OPERATION: &str = "CartLinesUpdate";
pub const CART_LINES_UPDATE: &str = cart_mutation!(
    "CartLinesUpdate($cartId: ID!, $lines: [CartLineUpdateInput!]!)",
    "cartLinesUpdate(cartId: $cartId, lines: $lines)"
);

pub const CART_LINES_REMOVE_OPERATION: &str = "CartLinesRemove";
pub const CART_LINES_REMOVE: &str = cart_mutation!(
    "CartLinesRemove($cartId: ID!, $lineIds: [ID!]!)",
    "cartLinesRemove(cartId: $cartId, lineIds: $lineIds)"
);

pub const CART_DISCOUNT_CODES_UPDATE_OPERATION: &str = "CartDiscountCodesUpdate";
pub const CART_DISCOUNT_CODES_UPDATE: &str = cart_mutation!(
    "CartDiscountCodesUpdate($cartId: ID!, $discountCodes: [String!]!)",
    "cartDiscountCodesUpdate(cartId: $cartId, discountCodes: $discountCodes)"
);

pub const CART_GIFT_CARD_CODES_UPDATE_OPERATION: &str = "CartGiftCardCodesUpdate";
pub const CART_GIFT_CARD_CODES_UPDATE: &str = cart_mutation!(
    "CartGiftCardCodesUpdate($cartId: ID!, $giftCardCodes: [String!]!)",
    "cartGiftCardCodesUpdate(cartId: $cartId, giftCardCodes: $giftCardCodes)"
);
