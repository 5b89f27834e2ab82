//! Tiny helper macro for deriving arithmetic on integer newtypes.

/// Implements a std::ops trait for a single-field tuple newtype by delegating to the inner value.
///
/// `op!(binary T, Add, add)` implements `T + T -> T`, `op!(inplace T, AddAssign, add_assign)`
/// implements `T += T`, and `op!(unary T, Neg, neg)` implements `-T`.
#[macro_export]
macro_rules! op {
    (binary $t:ident, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0, rhs.0))
            }
        }
    };
    (inplace $t:ident, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            fn $method(&mut self, rhs: Self) {
                std::ops::$trait::$method(&mut self.0, rhs.0)
            }
        }
    };
    (unary $t:ident, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0))
            }
        }
    };
}
