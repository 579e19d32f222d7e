/// Implements the std arithmetic traits for single-field tuple structs.
///
/// The inner type must itself implement the corresponding trait. Usage:
/// `op!(binary Amount, Add, add)`, `op!(inplace Amount, SubAssign, sub_assign)`,
/// `op!(unary Amount, Neg, neg)`.
#[macro_export]
macro_rules! op {
    (binary $t:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0, rhs.0))
            }
        }
    };
    (inplace $t:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            fn $method(&mut self, rhs: Self) {
                std::ops::$trait::$method(&mut self.0, rhs.0);
            }
        }
    };
    (unary $t:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $t {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0))
            }
        }
    };
}
